//! Response encoders for file-like return values.
//!
//! Converts file representations produced by application code into
//! byte-level responses, with conditional-request (not-modified) handling
//! shared across the variants. Each encoder declares the exact value kind
//! it handles so the finalization pipeline can dispatch.

mod file;
pub(crate) mod support;

pub use file::{FileEncoder, StreamFileEncoder, SystemFileEncoder};

use crate::error::HttpError;
use crate::exchange::{ExchangeRequest, ExchangeResponse};
use crate::server::raw::ChunkReceiver;
use std::io::Read;
use std::path::PathBuf;

/// A file on disk served through a generic buffered read.
#[derive(Debug, Clone)]
pub struct DiskFile {
    pub path: PathBuf,
    /// Declared media type; when absent the type is inferred from the
    /// filename extension.
    pub media_type: Option<String>,
}

impl DiskFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            media_type: None,
        }
    }
}

/// A file on disk served through the engine's most direct filesystem path.
#[derive(Debug, Clone)]
pub struct SystemFile {
    pub path: PathBuf,
    pub media_type: Option<String>,
}

impl SystemFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            media_type: None,
        }
    }
}

/// A file-like resource backed by an arbitrary byte stream.
pub struct StreamedFile {
    pub source: Box<dyn Read + Send>,
    /// Name used for extension-based content-type inference.
    pub name: String,
    pub media_type: Option<String>,
    /// Seconds since the Unix epoch, when known.
    pub last_modified: Option<u64>,
    pub length: Option<u64>,
}

impl std::fmt::Debug for StreamedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamedFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("last_modified", &self.last_modified)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// The file-like response body values, one per encoder variant.
#[derive(Debug)]
pub enum FileBody {
    Disk(DiskFile),
    System(SystemFile),
    Streamed(StreamedFile),
}

impl FileBody {
    pub fn kind(&self) -> FileKind {
        match self {
            FileBody::Disk(_) => FileKind::Disk,
            FileBody::System(_) => FileKind::System,
            FileBody::Streamed(_) => FileKind::Streamed,
        }
    }
}

/// Dispatch key: the return-value kind an encoder handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Disk,
    System,
    Streamed,
}

/// How the finalization pipeline must emit the encoded value.
pub enum EncodeAction {
    /// Conditional request hit: 304, empty body.
    NotModified,
    /// Complete body bytes.
    Bytes(Vec<u8>),
    /// Direct filesystem send through [`crate::server::raw::RawResponse::send_file`].
    File(PathBuf),
    /// Chunked stream.
    Stream(ChunkReceiver),
}

/// One encoder variant. `encode` mutates the response draft (status,
/// date/cache headers, content type and length) and reports how the body
/// must be emitted.
pub trait ResponseEncoder: Send + Sync {
    fn response_type(&self) -> FileKind;

    fn encode(
        &self,
        request: &ExchangeRequest,
        response: &mut ExchangeResponse,
        value: FileBody,
    ) -> Result<EncodeAction, HttpError>;
}
