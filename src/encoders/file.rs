//! The three file encoder variants.

use super::support;
use super::{EncodeAction, FileBody, FileKind, ResponseEncoder};
use crate::error::HttpError;
use crate::exchange::{ExchangeRequest, ExchangeResponse};
use may::sync::mpsc;
use std::fs;
use std::io::Read;
use tracing::{debug, warn};

const STREAM_CHUNK_BYTES: usize = 8 * 1024;

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Drive a reader into a chunk channel on its own coroutine.
fn stream_reader(mut source: Box<dyn Read + Send>) -> crate::server::raw::ChunkReceiver {
    let (tx, rx) = mpsc::channel();
    may::go!(move || {
        let mut chunk = vec![0u8; STREAM_CHUNK_BYTES];
        loop {
            match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(Ok(chunk[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "file stream read failed");
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
    });
    rx
}

/// Run the shared conditional-request check and header setup. Returns
/// `true` when a not-modified short circuit applies: the draft is switched
/// to 304 with no body and no content type.
fn prepare(
    request: &ExchangeRequest,
    response: &mut ExchangeResponse,
    last_modified: Option<u64>,
    content_type: String,
    length: Option<u64>,
) -> bool {
    if support::is_not_modified(request, last_modified) {
        debug!("conditional request satisfied; responding not modified");
        let _ = response.set_status(304);
        return true;
    }
    let _ = response.set_content_type(content_type);
    support::set_date_and_cache_headers(response, last_modified);
    if let Some(length) = length {
        let _ = response.set_content_length(length);
    } else {
        let _ = response.set_header("Transfer-Encoding", "chunked");
    }
    false
}

/// Generic buffered read of a file on disk.
pub struct FileEncoder;

impl ResponseEncoder for FileEncoder {
    fn response_type(&self) -> FileKind {
        FileKind::Disk
    }

    fn encode(
        &self,
        request: &ExchangeRequest,
        response: &mut ExchangeResponse,
        value: FileBody,
    ) -> Result<EncodeAction, HttpError> {
        let FileBody::Disk(file) = value else {
            return Err(HttpError::Codec {
                media_type: String::new(),
                message: "file encoder received a non-disk value".to_string(),
            });
        };
        let last_modified = support::file_last_modified(&file.path);
        let length = fs::metadata(&file.path).ok().map(|m| m.len());
        let content_type =
            support::resolve_content_type(file.media_type.as_deref(), &file_name(&file.path));
        if prepare(request, response, last_modified, content_type, length) {
            return Ok(EncodeAction::NotModified);
        }
        let bytes = fs::read(&file.path).map_err(HttpError::ResponseWrite)?;
        Ok(EncodeAction::Bytes(bytes))
    }
}

/// Chunked read loop over an arbitrary byte stream.
pub struct StreamFileEncoder;

impl ResponseEncoder for StreamFileEncoder {
    fn response_type(&self) -> FileKind {
        FileKind::Streamed
    }

    fn encode(
        &self,
        request: &ExchangeRequest,
        response: &mut ExchangeResponse,
        value: FileBody,
    ) -> Result<EncodeAction, HttpError> {
        let FileBody::Streamed(file) = value else {
            return Err(HttpError::Codec {
                media_type: String::new(),
                message: "stream encoder received a non-streamed value".to_string(),
            });
        };
        let content_type = support::resolve_content_type(file.media_type.as_deref(), &file.name);
        if prepare(request, response, file.last_modified, content_type, file.length) {
            return Ok(EncodeAction::NotModified);
        }
        Ok(EncodeAction::Stream(stream_reader(file.source)))
    }
}

/// Direct-from-filesystem send, delegating the byte transfer to the
/// engine's most efficient path. When async file serving is enabled the
/// file is streamed instead of handed over wholesale.
pub struct SystemFileEncoder {
    async_file_serving: bool,
}

impl SystemFileEncoder {
    pub fn new(async_file_serving: bool) -> Self {
        Self { async_file_serving }
    }
}

impl ResponseEncoder for SystemFileEncoder {
    fn response_type(&self) -> FileKind {
        FileKind::System
    }

    fn encode(
        &self,
        request: &ExchangeRequest,
        response: &mut ExchangeResponse,
        value: FileBody,
    ) -> Result<EncodeAction, HttpError> {
        let FileBody::System(file) = value else {
            return Err(HttpError::Codec {
                media_type: String::new(),
                message: "system encoder received a non-system value".to_string(),
            });
        };
        let last_modified = support::file_last_modified(&file.path);
        let length = fs::metadata(&file.path).ok().map(|m| m.len());
        let content_type =
            support::resolve_content_type(file.media_type.as_deref(), &file_name(&file.path));
        if prepare(request, response, last_modified, content_type, length) {
            return Ok(EncodeAction::NotModified);
        }
        if self.async_file_serving {
            let source = fs::File::open(&file.path).map_err(HttpError::ResponseWrite)?;
            return Ok(EncodeAction::Stream(stream_reader(Box::new(source))));
        }
        Ok(EncodeAction::File(file.path))
    }
}
