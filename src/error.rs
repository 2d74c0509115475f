//! Error taxonomy for the adapter layer.
//!
//! Binding failures are deliberately *not* part of this hierarchy: a binder
//! that cannot convert reports a structured [`ConversionError`] inside its
//! `BindingResult`, and the dispatch layer decides how to map it. Everything
//! here propagates to the handler boundary, which still guarantees a terminal
//! native response.

use std::io;
use thiserror::Error;

/// Errors raised by [`crate::buffer::ByteBuf`] cursor operations.
///
/// Both variants are detected before any mutation takes place, so a failed
/// read or write never leaves the buffer partially advanced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// A read requested more bytes than are readable.
    #[error("read of {requested} bytes exceeds {available} readable bytes")]
    OutOfBounds { requested: usize, available: usize },
    /// A write requested more bytes than remain before capacity.
    #[error("write of {requested} bytes exceeds {available} writable bytes (capacity {capacity})")]
    CapacityExceeded {
        requested: usize,
        available: usize,
        capacity: usize,
    },
}

/// Caller-contract violations around per-request lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// `service()` was invoked on a handler that was already closed.
    #[error("handler is closed")]
    AlreadyClosed,
    /// A response mutator was invoked after the head was flushed.
    #[error("response already flushed to the native response")]
    AlreadyFlushed,
    /// A body materialization re-entered while another was in flight.
    #[error("request body is already being read")]
    ReentrantBodyRead,
    /// The one-shot lazy body source was taken twice.
    #[error("request body source was already consumed")]
    BodySourceConsumed,
    /// `complete()` was signalled more than once for one continuation.
    #[error("async continuation already completed")]
    AsyncAlreadyCompleted,
}

/// Errors from parsing `multipart/form-data` bodies.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("multipart content type carries no boundary parameter")]
    MissingBoundary,
    #[error("malformed multipart body: {0}")]
    Malformed(&'static str),
    #[error("part '{name}' of {size} bytes exceeds the {max} byte part limit")]
    PartTooLarge { name: String, size: usize, max: usize },
    #[error("multipart parts total {size} bytes, exceeding the {max} byte request limit")]
    RequestTooLarge { size: usize, max: usize },
    #[error("multipart body has more than {max} parts")]
    TooManyParts { max: usize },
}

/// Errors from engine server construction and lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid TLS configuration: {0}")]
    Tls(String),
    #[error("engine error: {0}")]
    Engine(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The crate-wide error type crossing the handler boundary.
#[derive(Debug, Error)]
pub enum HttpError {
    /// I/O failure while materializing a request body. Partially buffered
    /// bytes are discarded, never returned.
    #[error("error reading request body: {0}")]
    BodyRead(#[source] io::Error),
    /// The declared body exceeds the configured size limit.
    #[error("request body exceeds the configured limit of {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// No codec is registered for the declared content type. Reported
    /// distinctly from decode failures.
    #[error("no codec registered for media type '{0}'")]
    UnsupportedMediaType(String),
    /// A codec matched but failed to decode or encode.
    #[error("codec error for media type '{media_type}': {message}")]
    Codec { media_type: String, message: String },
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Server(#[from] ServerError),
    /// I/O failure writing to the native response.
    #[error("error writing response: {0}")]
    ResponseWrite(#[source] io::Error),
}

impl HttpError {
    /// Status code the handler boundary maps this error to when it must
    /// produce a best-effort terminal response.
    pub fn status(&self) -> u16 {
        match self {
            HttpError::UnsupportedMediaType(_) => 415,
            HttpError::BodyTooLarge { .. } => 413,
            HttpError::Multipart(
                MultipartError::PartTooLarge { .. } | MultipartError::RequestTooLarge { .. },
            ) => 413,
            HttpError::Codec { .. } | HttpError::Multipart(_) => 400,
            _ => 500,
        }
    }
}

/// A structured conversion failure produced at bind time.
///
/// Carried inside `BindingResult::Failed`; the external dispatch layer
/// decides the response mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    /// Name of the argument that failed to bind.
    pub argument: String,
    pub message: String,
}

impl ConversionError {
    pub fn new(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            argument: argument.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot convert argument [{}]: {}", self.argument, self.message)
    }
}
