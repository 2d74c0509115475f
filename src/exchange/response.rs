//! The application-facing response wrapper.
//!
//! Mutations accumulate in an in-memory draft; nothing touches the native
//! response until the handler finalizes the exchange. After the flush every
//! mutator fails with [`LifecycleError::AlreadyFlushed`]. Dropping an
//! unflushed response emits a best-effort 500 so a native connection is
//! never left without a terminal status.

use crate::cookies::Cookie;
use crate::encoders::FileBody;
use crate::error::LifecycleError;
#[cfg(test)]
use crate::error::HttpError;
use crate::headers::Headers;
use crate::server::raw::{ChunkReceiver, RawResponse, ResponseHead};
use may::sync::mpsc;
use serde_json::Value;
use std::io::{self, Write};
use tracing::error;

/// The draft body, encoded at finalization.
pub enum ResponseBody {
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
    /// A file-like value handed to the matching response encoder.
    File(FileBody),
    /// An asynchronous push-based chunk sequence.
    Stream(ChunkReceiver),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "Empty"),
            ResponseBody::Text(s) => write!(f, "Text({} bytes)", s.len()),
            ResponseBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ResponseBody::Json(_) => write!(f, "Json"),
            ResponseBody::File(_) => write!(f, "File"),
            ResponseBody::Stream(_) => write!(f, "Stream"),
        }
    }
}

pub struct ExchangeResponse {
    raw: Option<Box<dyn RawResponse>>,
    status: u16,
    reason: Option<String>,
    headers: Headers,
    cookies: Vec<Cookie>,
    content_type: Option<String>,
    content_length: Option<u64>,
    locale: Option<String>,
    body: ResponseBody,
    writer_taken: bool,
    flushed: bool,
}

impl ExchangeResponse {
    pub(crate) fn new(raw: Box<dyn RawResponse>) -> Self {
        Self {
            raw: Some(raw),
            status: 200,
            reason: None,
            headers: Headers::new(),
            cookies: Vec::new(),
            content_type: None,
            content_length: None,
            locale: None,
            body: ResponseBody::Empty,
            writer_taken: false,
            flushed: false,
        }
    }

    fn guard(&self) -> Result<(), LifecycleError> {
        if self.flushed {
            Err(LifecycleError::AlreadyFlushed)
        } else {
            Ok(())
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) -> Result<(), LifecycleError> {
        self.guard()?;
        self.status = status;
        Ok(())
    }

    /// Status with a custom reason phrase.
    pub fn set_status_reason(
        &mut self,
        status: u16,
        reason: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        self.guard()?;
        self.status = status;
        self.reason = Some(reason.into());
        Ok(())
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn add_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        self.guard()?;
        self.headers.add(name, value);
        Ok(())
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> Result<(), LifecycleError> {
        self.guard()?;
        self.headers.set(name, value);
        Ok(())
    }

    pub fn add_cookie(&mut self, cookie: Cookie) -> Result<(), LifecycleError> {
        self.guard()?;
        self.cookies.push(cookie);
        Ok(())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> Result<(), LifecycleError> {
        self.guard()?;
        self.content_type = Some(content_type.into());
        Ok(())
    }

    pub fn set_content_length(&mut self, length: u64) -> Result<(), LifecycleError> {
        self.guard()?;
        self.content_length = Some(length);
        Ok(())
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) -> Result<(), LifecycleError> {
        self.guard()?;
        self.locale = Some(locale.into());
        Ok(())
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Set the draft body. Mutually exclusive with [`ExchangeResponse::writer`].
    pub fn set_body(&mut self, body: ResponseBody) -> Result<(), LifecycleError> {
        self.guard()?;
        debug_assert!(!self.writer_taken, "body set after writer() was taken");
        self.body = body;
        Ok(())
    }

    /// Mark the response as backed by an asynchronous chunk sequence.
    /// Finalization writes chunks as they arrive and completes the native
    /// response when the sequence completes or errors.
    pub fn stream(&mut self, chunks: ChunkReceiver) -> Result<(), LifecycleError> {
        self.guard()?;
        self.body = ResponseBody::Stream(chunks);
        Ok(())
    }

    /// Lower-level escape hatch: a writer whose bytes bypass the draft body.
    /// Using it after `set_body`, or vice versa, is a caller-contract
    /// violation.
    pub fn writer(&mut self) -> Result<ResponseWriter, LifecycleError> {
        self.guard()?;
        let (tx, rx) = mpsc::channel();
        self.writer_taken = true;
        self.body = ResponseBody::Stream(rx);
        Ok(ResponseWriter { tx })
    }

    pub(crate) fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Pull the draft body out for encoding, leaving `Empty` behind.
    pub(crate) fn take_body(&mut self) -> ResponseBody {
        std::mem::replace(&mut self.body, ResponseBody::Empty)
    }

    /// Assemble the native response head from the draft.
    pub(crate) fn build_head(&self) -> ResponseHead {
        let mut head = ResponseHead::new(self.status);
        head.reason = self.reason.clone();
        head.headers = self.headers.clone();
        if let Some(ct) = &self.content_type {
            if !head.headers.contains("content-type") {
                head.headers.set("Content-Type", ct.clone());
            }
        }
        if let Some(len) = self.content_length {
            head.headers.set("Content-Length", len.to_string());
        }
        if let Some(locale) = &self.locale {
            head.headers.set("Content-Language", locale.clone());
        }
        for cookie in &self.cookies {
            head.headers.add("Set-Cookie", cookie.to_set_cookie());
        }
        head
    }

    /// Hand the draft and native sink to the finalization pipeline. The
    /// response is marked flushed regardless of the outcome so the drop
    /// guard does not double-send.
    pub(crate) fn take_for_flush(&mut self) -> Option<(Box<dyn RawResponse>, ResponseBody)> {
        if self.flushed {
            return None;
        }
        self.flushed = true;
        let raw = self.raw.take()?;
        let body = std::mem::replace(&mut self.body, ResponseBody::Empty);
        Some((raw, body))
    }
}

impl Drop for ExchangeResponse {
    fn drop(&mut self) {
        if self.flushed {
            return;
        }
        // Dispatch dropped the exchange without finalizing (panic or logic
        // error). Emit a terminal status rather than hanging the connection.
        if let Some(mut raw) = self.raw.take() {
            self.flushed = true;
            let head = ResponseHead::new(500);
            if let Err(e) = raw.send(head, Vec::new()) {
                error!(error = %e, "failed to emit fallback 500 response");
            }
        }
    }
}

/// Writer side of the response escape hatch. Each `write` pushes one chunk
/// to the native response; dropping the writer completes the stream.
pub struct ResponseWriter {
    tx: mpsc::Sender<io::Result<Vec<u8>>>,
}

impl Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(Ok(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response stream closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::raw::ResponseHead;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Sink {
        sent: Arc<Mutex<Option<(u16, Vec<u8>)>>>,
    }

    impl RawResponse for Sink {
        fn send(&mut self, head: ResponseHead, body: Vec<u8>) -> Result<(), HttpError> {
            *self.sent.lock().unwrap() = Some((head.status, body));
            Ok(())
        }

        fn send_stream(
            &mut self,
            head: ResponseHead,
            chunks: ChunkReceiver,
        ) -> Result<(), HttpError> {
            let mut body = Vec::new();
            while let Ok(Ok(chunk)) = chunks.recv() {
                body.extend_from_slice(&chunk);
            }
            *self.sent.lock().unwrap() = Some((head.status, body));
            Ok(())
        }

        fn send_file(&mut self, _head: ResponseHead, _path: &Path) -> Result<(), HttpError> {
            unreachable!("not used in these tests")
        }
    }

    #[test]
    fn test_draft_defers_native_writes() {
        let sent = Arc::new(Mutex::new(None));
        let sink = Sink { sent: sent.clone() };
        let mut res = ExchangeResponse::new(Box::new(sink));
        res.set_status(201).unwrap();
        res.set_header("X-Tag", "a").unwrap();
        // Nothing flushed yet.
        assert!(sent.lock().unwrap().is_none());
        let (mut raw, _body) = res.take_for_flush().unwrap();
        raw.send(res.build_head(), b"ok".to_vec()).unwrap();
        assert_eq!(sent.lock().unwrap().as_ref().unwrap().0, 201);
    }

    #[test]
    fn test_mutation_after_flush_errors() {
        let sink = Sink::default();
        let mut res = ExchangeResponse::new(Box::new(sink));
        let _ = res.take_for_flush().unwrap();
        assert_eq!(res.set_status(404), Err(LifecycleError::AlreadyFlushed));
        assert_eq!(res.add_header("a", "b"), Err(LifecycleError::AlreadyFlushed));
    }

    #[test]
    fn test_drop_without_flush_emits_500() {
        let sent = Arc::new(Mutex::new(None));
        {
            let sink = Sink { sent: sent.clone() };
            let res = ExchangeResponse::new(Box::new(sink));
            drop(res);
        }
        assert_eq!(sent.lock().unwrap().as_ref().unwrap().0, 500);
    }

    #[test]
    fn test_set_cookie_headers_in_insertion_order() {
        let sink = Sink::default();
        let mut res = ExchangeResponse::new(Box::new(sink));
        res.add_cookie(Cookie::new("b", "2")).unwrap();
        res.add_cookie(Cookie::new("a", "1")).unwrap();
        let head = res.build_head();
        assert_eq!(head.headers.get_all("set-cookie"), vec!["b=2", "a=1"]);
        let _ = res.take_for_flush();
    }
}
