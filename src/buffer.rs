//! Cursor-based byte buffer backing all body-byte handling.
//!
//! A [`ByteBuf`] wraps one contiguous block with independent read and write
//! cursors. Capacity is fixed at construction; operations that would exceed
//! the readable or writable span fail before touching the buffer, so the
//! invariant `reader <= writer <= capacity` holds after any sequence of
//! operations, successful or not.

use crate::error::BufferError;

/// A fixed-capacity byte block with independent reader and writer cursors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteBuf {
    bytes: Vec<u8>,
    reader: usize,
    writer: usize,
}

impl ByteBuf {
    /// Wrap fully-written bytes: the writer cursor starts at the end, the
    /// reader at the beginning, so the whole block is readable.
    pub fn new(bytes: Vec<u8>) -> Self {
        let writer = bytes.len();
        Self {
            bytes,
            reader: 0,
            writer,
        }
    }

    /// Wrap bytes with an explicit starting writer position. Positions past
    /// the block length are clamped to it.
    pub fn with_writer_index(bytes: Vec<u8>, writer: usize) -> Self {
        let writer = writer.min(bytes.len());
        Self {
            bytes,
            reader: 0,
            writer,
        }
    }

    /// An empty, zero-filled buffer of the given capacity ready for writing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            reader: 0,
            writer: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn reader_index(&self) -> usize {
        self.reader
    }

    pub fn writer_index(&self) -> usize {
        self.writer
    }

    /// Bytes available to read: `writer - reader`.
    pub fn readable_bytes(&self) -> usize {
        self.writer - self.reader
    }

    /// Bytes available to write before capacity.
    pub fn writable_bytes(&self) -> usize {
        self.bytes.len() - self.writer
    }

    /// Move the reader cursor. Fails if the position would pass the writer.
    pub fn set_reader_index(&mut self, position: usize) -> Result<(), BufferError> {
        if position > self.writer {
            return Err(BufferError::OutOfBounds {
                requested: position,
                available: self.writer,
            });
        }
        self.reader = position;
        Ok(())
    }

    /// Move the writer cursor. Fails if the position would exceed capacity
    /// or fall behind the reader.
    pub fn set_writer_index(&mut self, position: usize) -> Result<(), BufferError> {
        if position > self.bytes.len() || position < self.reader {
            return Err(BufferError::CapacityExceeded {
                requested: position,
                available: self.writable_bytes(),
                capacity: self.bytes.len(),
            });
        }
        self.writer = position;
        Ok(())
    }

    /// Read one byte, advancing the reader cursor.
    pub fn read_byte(&mut self) -> Result<u8, BufferError> {
        if self.readable_bytes() == 0 {
            return Err(BufferError::OutOfBounds {
                requested: 1,
                available: 0,
            });
        }
        let b = self.bytes[self.reader];
        self.reader += 1;
        Ok(b)
    }

    /// Fill `destination` entirely, advancing the reader cursor. Fails
    /// without advancing when fewer bytes are readable than requested.
    pub fn read_into(&mut self, destination: &mut [u8]) -> Result<(), BufferError> {
        let requested = destination.len();
        let available = self.readable_bytes();
        if requested > available {
            return Err(BufferError::OutOfBounds {
                requested,
                available,
            });
        }
        destination.copy_from_slice(&self.bytes[self.reader..self.reader + requested]);
        self.reader += requested;
        Ok(())
    }

    /// Write one byte, advancing the writer cursor.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), BufferError> {
        if self.writable_bytes() == 0 {
            return Err(BufferError::CapacityExceeded {
                requested: 1,
                available: 0,
                capacity: self.bytes.len(),
            });
        }
        self.bytes[self.writer] = byte;
        self.writer += 1;
        Ok(())
    }

    /// Write all of `source`, advancing the writer cursor. Fails without
    /// writing anything when the span exceeds the remaining capacity: there
    /// is no implicit reallocation and no partial write.
    pub fn write_all(&mut self, source: &[u8]) -> Result<(), BufferError> {
        let requested = source.len();
        let available = self.writable_bytes();
        if requested > available {
            return Err(BufferError::CapacityExceeded {
                requested,
                available,
                capacity: self.bytes.len(),
            });
        }
        self.bytes[self.writer..self.writer + requested].copy_from_slice(source);
        self.writer += requested;
        Ok(())
    }

    /// Borrowed read-only view of `len` bytes starting at `start`, without
    /// copying and without advancing either cursor.
    pub fn slice(&self, start: usize, len: usize) -> Result<&[u8], BufferError> {
        let end = start.checked_add(len).unwrap_or(usize::MAX);
        if end > self.writer {
            return Err(BufferError::OutOfBounds {
                requested: len,
                available: self.writer.saturating_sub(start),
            });
        }
        Ok(&self.bytes[start..end])
    }

    /// Linear scan for `byte` from the reader cursor forward. Returns the
    /// absolute index of the first occurrence.
    pub fn index_of(&self, byte: u8) -> Option<usize> {
        self.bytes[self.reader..self.writer]
            .iter()
            .position(|&b| b == byte)
            .map(|p| p + self.reader)
    }

    /// The currently readable span, cursors untouched.
    pub fn readable(&self) -> &[u8] {
        &self.bytes[self.reader..self.writer]
    }

    /// Copy the readable span into an owned vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.readable().to_vec()
    }
}

impl From<Vec<u8>> for ByteBuf {
    fn from(bytes: Vec<u8>) -> Self {
        ByteBuf::new(bytes)
    }
}
