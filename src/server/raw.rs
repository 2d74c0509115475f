//! The per-engine adapter contract.
//!
//! Each native engine translates its own request/response shapes into these
//! two traits; everything above this module is engine-agnostic. The core
//! never names an engine-specific type.

use crate::error::HttpError;
use crate::headers::Headers;
use http::Method;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::Path;

/// Engine-neutral request metadata, parsed once by the engine adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHead {
    pub method: Method,
    /// The request target as received, including any query string.
    pub uri: String,
    pub headers: Headers,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestHead {
    pub fn new(
        method: Method,
        uri: impl Into<String>,
        headers: Headers,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers,
            remote_addr,
        }
    }

    /// Path component of the request target, query stripped.
    pub fn path(&self) -> &str {
        match self.uri.split_once('?') {
            Some((path, _)) => path,
            None => &self.uri,
        }
    }

    /// Raw query string, empty when absent.
    pub fn query(&self) -> &str {
        self.uri.split_once('?').map(|(_, q)| q).unwrap_or("")
    }

    /// Decoded query parameters in order of appearance.
    pub fn query_params(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query().as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Last occurrence wins, matching duplicate-parameter precedence used
    /// for cookies.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params()
            .into_iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers.get("content-length").and_then(|v| v.parse().ok())
    }

    /// Charset declared on the content type, defaulting to UTF-8.
    pub fn character_encoding(&self) -> String {
        self.content_type()
            .and_then(|ct| crate::codec::media::parameter(ct, "charset").map(str::to_string))
            .unwrap_or_else(|| "utf-8".to_string())
    }

    /// The most-preferred `Accept-Language` tag, if any.
    pub fn locale(&self) -> Option<String> {
        self.headers
            .get("accept-language")
            .and_then(|v| v.split(',').next())
            .map(|tag| tag.split(';').next().unwrap_or(tag).trim().to_string())
            .filter(|tag| !tag.is_empty())
    }
}

/// Engine-neutral response head handed to the native layer at flush time.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    /// Custom reason phrase; engines fall back to the standard phrase.
    pub reason: Option<String>,
    pub headers: Headers,
}

impl ResponseHead {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: None,
            headers: Headers::new(),
        }
    }
}

/// Push-based chunk sequence for streamed response bodies.
pub type ChunkReceiver = may::sync::mpsc::Receiver<io::Result<Vec<u8>>>;

/// The native request as the core sees it.
///
/// `read_body` pulls the engine's input stream to exhaustion; the exchange
/// layer guarantees it is called at most once per request.
pub trait RawRequest: Send {
    fn head(&self) -> &RequestHead;

    /// Drain the native body stream. Engines must not buffer beyond what
    /// their runtime already buffered before this call.
    fn read_body(&mut self) -> Result<Vec<u8>, HttpError>;

    /// Whether this engine can keep the connection open past the servicing
    /// call for an async continuation.
    fn async_supported(&self) -> bool {
        true
    }
}

/// The native response as the core sees it. Exactly one `send*` call is
/// made per request, after the draft is finalized.
pub trait RawResponse: Send {
    /// Write head and complete body in one shot.
    fn send(&mut self, head: ResponseHead, body: Vec<u8>) -> Result<(), HttpError>;

    /// Write the head, then chunks as they arrive, completing the native
    /// response when the sequence completes or errors.
    fn send_stream(&mut self, head: ResponseHead, chunks: ChunkReceiver) -> Result<(), HttpError>;

    /// Serve a file from disk. The default is a buffered read; engines with
    /// a more direct filesystem path may override.
    fn send_file(&mut self, head: ResponseHead, path: &Path) -> Result<(), HttpError> {
        let bytes = std::fs::read(path).map_err(HttpError::ResponseWrite)?;
        self.send(head, bytes)
    }
}

/// Drain `reader`, enforcing an optional byte limit.
///
/// On limit violation the partial bytes are dropped and the native request
/// is considered poisoned for body purposes.
pub fn read_limited(reader: &mut dyn Read, limit: Option<usize>) -> Result<Vec<u8>, HttpError> {
    let mut out = Vec::new();
    match limit {
        Some(limit) => {
            // Read one byte past the limit to distinguish "exactly at the
            // limit" from "over it".
            let mut bounded = reader.take(limit as u64 + 1);
            bounded
                .read_to_end(&mut out)
                .map_err(HttpError::BodyRead)?;
            if out.len() > limit {
                return Err(HttpError::BodyTooLarge { limit });
            }
        }
        None => {
            reader.read_to_end(&mut out).map_err(HttpError::BodyRead)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(uri: &str) -> RequestHead {
        RequestHead::new(Method::GET, uri, Headers::new(), None)
    }

    #[test]
    fn test_path_and_query_split() {
        let h = head("/users?limit=10&limit=25");
        assert_eq!(h.path(), "/users");
        assert_eq!(h.query(), "limit=10&limit=25");
        assert_eq!(h.query_param("limit").as_deref(), Some("25"));
        assert_eq!(head("/plain").query(), "");
    }

    #[test]
    fn test_character_encoding_default() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain; charset=latin1");
        let h = RequestHead::new(Method::POST, "/", headers, None);
        assert_eq!(h.character_encoding(), "latin1");
        assert_eq!(head("/").character_encoding(), "utf-8");
    }

    #[test]
    fn test_read_limited_enforces_limit() {
        let mut data: &[u8] = b"0123456789";
        assert!(matches!(
            read_limited(&mut data, Some(4)),
            Err(HttpError::BodyTooLarge { limit: 4 })
        ));
        let mut data: &[u8] = b"0123";
        assert_eq!(read_limited(&mut data, Some(4)).unwrap(), b"0123");
    }
}
