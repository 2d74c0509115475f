//! Typed argument binding from requests.
//!
//! The external router describes each application-method argument as an
//! [`ArgumentSpec`]; the registry resolves it to exactly one binder. The
//! resolution is total — a fallback body binder guarantees a match — so
//! "no binder found" is not a representable outcome, and genuine failure
//! is deferred to bind-time conversion.

mod binders;
mod registry;

pub use binders::{
    BodyBinder, CookieValueBinder, HeaderBinder, PartBinder, PathVariableBinder,
    QueryValueBinder, RequestInfoBinder, UploadBinder, UploadsBinder,
};
pub use registry::BinderRegistry;

use crate::error::ConversionError;
use crate::exchange::{DecodedBody, ExchangeRequest};
use crate::multipart::CompletedUpload;
use crate::server::raw::RequestHead;
use serde_json::Value;

/// The binding annotation an argument declares, if any. The Rust rendition
/// of annotation-type binder keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingAnnotation {
    Header,
    QueryValue,
    PathVariable,
    CookieValue,
    Part,
    Body,
}

/// The declared class of an argument. The Rust rendition of class-keyed
/// binder lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    /// Structured value decoded by a body codec.
    Json,
    Text,
    Bytes,
    /// One completed multipart part.
    Upload,
    /// Every completed multipart part.
    Uploads,
    /// The request metadata itself.
    RequestInfo,
}

/// Description of one application-method argument to bind.
#[derive(Debug, Clone)]
pub struct ArgumentSpec {
    /// The argument name; doubles as the source name (header, query
    /// parameter, cookie or part name) unless [`ArgumentSpec::source_name`]
    /// overrides it.
    pub name: String,
    pub annotation: Option<BindingAnnotation>,
    pub target: TargetType,
    /// Explicit source name when it differs from the argument name, e.g. a
    /// header annotation naming `X-Request-Id` for an argument `request_id`.
    pub source_name: Option<String>,
    pub required: bool,
}

impl ArgumentSpec {
    pub fn new(name: impl Into<String>, target: TargetType) -> Self {
        Self {
            name: name.into(),
            annotation: None,
            target,
            source_name: None,
            required: false,
        }
    }

    pub fn annotated(mut self, annotation: BindingAnnotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    pub fn from_source(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The name binders look up in the request.
    pub fn lookup_name(&self) -> &str {
        self.source_name.as_deref().unwrap_or(&self.name)
    }
}

/// A value produced by a binder.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
    Upload(CompletedUpload),
    Uploads(Vec<CompletedUpload>),
    RequestInfo(RequestHead),
}

impl BoundValue {
    fn from_decoded(decoded: DecodedBody) -> Self {
        match decoded {
            DecodedBody::Json(v) => BoundValue::Json(v),
            DecodedBody::Text(s) => BoundValue::Text(s),
            DecodedBody::Bytes(b) => BoundValue::Bytes(b),
        }
    }
}

/// Outcome of one bind attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingResult {
    /// A value was produced.
    Satisfied(BoundValue),
    /// The source is absent; not an error (e.g. an optional argument).
    Unsatisfied,
    /// The source was present but could not be converted. A structured
    /// failure for the dispatch layer, not a fault.
    Failed(ConversionError),
}

impl BindingResult {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, BindingResult::Satisfied(_))
    }
}

/// Strategy extracting one typed argument value from a request.
pub trait ArgumentBinder: Send + Sync {
    fn bind(&self, spec: &ArgumentSpec, request: &mut ExchangeRequest) -> BindingResult;
}
