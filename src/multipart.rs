//! Completed multipart uploads.
//!
//! A [`CompletedUpload`] is one fully-received `multipart/form-data` part.
//! Parsing happens in the engine-neutral parameter machinery
//! ([`crate::server::form`]); once constructed a part is immutable.

use crate::buffer::ByteBuf;

/// One completed multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl CompletedUpload {
    pub fn new(
        name: impl Into<String>,
        filename: Option<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            filename,
            content_type,
            bytes,
        }
    }

    /// The form field name of the part.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The client-declared filename, if the part is a file upload.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Declared size of the part in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the part was fully received. Parts constructed here always
    /// are; the flag exists for engines that can surface partial uploads.
    pub fn is_complete(&self) -> bool {
        true
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The part content as a cursor buffer for byte-level consumers.
    pub fn to_buffer(&self) -> ByteBuf {
        ByteBuf::new(self.bytes.clone())
    }

    /// The part content decoded as UTF-8, for plain form fields.
    pub fn text(&self) -> Option<String> {
        String::from_utf8(self.bytes.clone()).ok()
    }
}
