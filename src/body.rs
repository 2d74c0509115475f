//! Buffering-versus-deferral decisions for incoming bodies.
//!
//! Form submissions are consumed by the engine-neutral parameter machinery
//! ([`crate::server::form`]); every other content type is pulled exactly
//! once from the native stream into a byte-accurate, replayable buffer the
//! exchange layer controls.

use crate::buffer::ByteBuf;
use crate::codec::media;
use crate::error::{HttpError, LifecycleError};
use crate::server::raw::RequestHead;

/// True iff the base media type is one of the two standard form-encoded
/// types, case-insensitively. Media type parameters are ignored.
pub fn is_form_submission(content_type: &str) -> bool {
    let base = media::base(content_type);
    base == media::FORM_URLENCODED || base == media::MULTIPART_FORM_DATA
}

/// A one-shot byte supplier over the native input stream.
///
/// The underlying stream must be pulled at most once per request; a second
/// take is a contract violation upstream and is reported as such rather
/// than returning empty bytes.
pub struct LazyBody<'a> {
    supplier: Option<Box<dyn FnOnce() -> Result<Vec<u8>, HttpError> + Send + 'a>>,
}

impl<'a> LazyBody<'a> {
    pub fn new(supplier: impl FnOnce() -> Result<Vec<u8>, HttpError> + Send + 'a) -> Self {
        Self {
            supplier: Some(Box::new(supplier)),
        }
    }

    /// Pull the full byte stream. Errors with
    /// [`LifecycleError::BodySourceConsumed`] on a second invocation.
    pub fn take(&mut self) -> Result<Vec<u8>, HttpError> {
        match self.supplier.take() {
            Some(supplier) => supplier(),
            None => Err(LifecycleError::BodySourceConsumed.into()),
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.supplier.is_none()
    }
}

/// The body representation chosen by content type.
#[derive(Debug, PartialEq, Eq)]
pub enum RawBody {
    /// No content was declared or sent.
    Empty,
    /// A form submission, deferred to the engine-neutral parameter parsing.
    Form,
    /// Any other content type, fully materialized.
    Bytes(ByteBuf),
}

/// Decide the body representation for `head` and materialize it if needed.
///
/// The lazy source is invoked at most once, and only on the buffered path.
pub fn build_body(lazy: &mut LazyBody<'_>, head: &RequestHead) -> Result<RawBody, HttpError> {
    let content_type = head.content_type().unwrap_or(media::APPLICATION_JSON);
    if is_form_submission(content_type) {
        return Ok(RawBody::Form);
    }
    match head.content_length() {
        None | Some(0) => Ok(RawBody::Empty),
        Some(_) => {
            let bytes = lazy.take()?;
            if bytes.is_empty() {
                Ok(RawBody::Empty)
            } else {
                Ok(RawBody::Bytes(ByteBuf::new(bytes)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::Headers;
    use http::Method;

    fn head_with(content_type: Option<&str>, content_length: Option<usize>) -> RequestHead {
        let mut headers = Headers::new();
        if let Some(ct) = content_type {
            headers.add("Content-Type", ct);
        }
        if let Some(len) = content_length {
            headers.add("Content-Length", len.to_string());
        }
        RequestHead::new(Method::POST, "/", headers, None)
    }

    #[test]
    fn test_is_form_submission_exact_types_only() {
        assert!(is_form_submission("application/x-www-form-urlencoded"));
        assert!(is_form_submission("MULTIPART/FORM-DATA; boundary=x"));
        assert!(is_form_submission("application/x-www-form-urlencoded; charset=utf-8"));
        assert!(!is_form_submission("application/json"));
        assert!(!is_form_submission("multipart/mixed"));
        assert!(!is_form_submission("text/plain"));
    }

    #[test]
    fn test_form_body_defers_without_touching_source() {
        let mut lazy = LazyBody::new(|| panic!("source must not be pulled"));
        let head = head_with(Some("application/x-www-form-urlencoded"), Some(7));
        assert_eq!(build_body(&mut lazy, &head).unwrap(), RawBody::Form);
        assert!(!lazy.is_consumed());
    }

    #[test]
    fn test_json_body_buffers_once() {
        let mut lazy = LazyBody::new(|| Ok(b"{\"x\":1}".to_vec()));
        let head = head_with(Some("application/json"), Some(7));
        match build_body(&mut lazy, &head).unwrap() {
            RawBody::Bytes(buf) => assert_eq!(buf.readable(), b"{\"x\":1}"),
            other => panic!("expected bytes, got {other:?}"),
        }
        assert!(lazy.is_consumed());
        assert!(matches!(
            lazy.take().unwrap_err(),
            HttpError::Lifecycle(LifecycleError::BodySourceConsumed)
        ));
    }

    #[test]
    fn test_missing_content_length_is_empty() {
        let mut lazy = LazyBody::new(|| panic!("source must not be pulled"));
        let head = head_with(Some("application/json"), None);
        assert_eq!(build_body(&mut lazy, &head).unwrap(), RawBody::Empty);
    }
}
