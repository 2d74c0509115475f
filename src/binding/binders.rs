//! Built-in argument binders.
//!
//! Each binder extracts one value kind from the request. Absence is
//! `Unsatisfied`, not an error; present-but-unconvertible sources produce a
//! structured `Failed`.

use super::{ArgumentBinder, ArgumentSpec, BindingResult, BoundValue, TargetType};
use crate::error::{ConversionError, HttpError};
use crate::exchange::{BodyTarget, ExchangeRequest};
use serde_json::Value;

fn convert_scalar(spec: &ArgumentSpec, raw: &str) -> BindingResult {
    match spec.target {
        TargetType::Text => BindingResult::Satisfied(BoundValue::Text(raw.to_string())),
        TargetType::Json => {
            BindingResult::Satisfied(BoundValue::Json(Value::String(raw.to_string())))
        }
        TargetType::Bytes => BindingResult::Satisfied(BoundValue::Bytes(raw.as_bytes().to_vec())),
        other => BindingResult::Failed(ConversionError::new(
            &spec.name,
            format!("scalar source cannot produce {other:?}"),
        )),
    }
}

/// Binds a request header by name.
pub struct HeaderBinder;

impl ArgumentBinder for HeaderBinder {
    fn bind(&self, spec: &ArgumentSpec, request: &mut ExchangeRequest) -> BindingResult {
        match request.headers().get(spec.lookup_name()) {
            Some(value) => {
                let value = value.to_string();
                convert_scalar(spec, &value)
            }
            None => BindingResult::Unsatisfied,
        }
    }
}

/// Binds a query parameter by name, last occurrence winning.
pub struct QueryValueBinder;

impl ArgumentBinder for QueryValueBinder {
    fn bind(&self, spec: &ArgumentSpec, request: &mut ExchangeRequest) -> BindingResult {
        match request.query_param(spec.lookup_name()) {
            Some(value) => convert_scalar(spec, &value),
            None => BindingResult::Unsatisfied,
        }
    }
}

/// Binds a path parameter installed by the external router.
pub struct PathVariableBinder;

impl ArgumentBinder for PathVariableBinder {
    fn bind(&self, spec: &ArgumentSpec, request: &mut ExchangeRequest) -> BindingResult {
        match request.path_param(spec.lookup_name()) {
            Some(value) => convert_scalar(spec, &value),
            None => BindingResult::Unsatisfied,
        }
    }
}

/// Binds a cookie value by name.
pub struct CookieValueBinder;

impl ArgumentBinder for CookieValueBinder {
    fn bind(&self, spec: &ArgumentSpec, request: &mut ExchangeRequest) -> BindingResult {
        match request.cookies().find_cookie(spec.lookup_name()) {
            Some(cookie) => {
                let value = cookie.value().to_string();
                convert_scalar(spec, &value)
            }
            None => BindingResult::Unsatisfied,
        }
    }
}

/// Binds one completed multipart part by name.
pub struct PartBinder;

impl ArgumentBinder for PartBinder {
    fn bind(&self, spec: &ArgumentSpec, request: &mut ExchangeRequest) -> BindingResult {
        match request.upload(spec.lookup_name()) {
            Ok(Some(part)) => match spec.target {
                TargetType::Upload => BindingResult::Satisfied(BoundValue::Upload(part)),
                TargetType::Bytes => {
                    BindingResult::Satisfied(BoundValue::Bytes(part.bytes().to_vec()))
                }
                TargetType::Text => match part.text() {
                    Some(text) => BindingResult::Satisfied(BoundValue::Text(text)),
                    None => BindingResult::Failed(ConversionError::new(
                        &spec.name,
                        "part content is not valid UTF-8",
                    )),
                },
                other => BindingResult::Failed(ConversionError::new(
                    &spec.name,
                    format!("multipart part cannot produce {other:?}"),
                )),
            },
            Ok(None) => BindingResult::Unsatisfied,
            Err(e) => BindingResult::Failed(ConversionError::new(&spec.name, e.to_string())),
        }
    }
}

/// Class-keyed binder for a single upload argument with no part annotation:
/// binds the part whose name matches the argument.
pub struct UploadBinder;

impl ArgumentBinder for UploadBinder {
    fn bind(&self, spec: &ArgumentSpec, request: &mut ExchangeRequest) -> BindingResult {
        PartBinder.bind(spec, request)
    }
}

/// Class-keyed binder producing every completed part.
pub struct UploadsBinder;

impl ArgumentBinder for UploadsBinder {
    fn bind(&self, spec: &ArgumentSpec, request: &mut ExchangeRequest) -> BindingResult {
        match request.uploads() {
            Ok(parts) => BindingResult::Satisfied(BoundValue::Uploads(parts.to_vec())),
            Err(e) => BindingResult::Failed(ConversionError::new(&spec.name, e.to_string())),
        }
    }
}

/// Class-keyed binder handing application code the request metadata.
pub struct RequestInfoBinder;

impl ArgumentBinder for RequestInfoBinder {
    fn bind(&self, _spec: &ArgumentSpec, request: &mut ExchangeRequest) -> BindingResult {
        BindingResult::Satisfied(BoundValue::RequestInfo(request.head().clone()))
    }
}

/// The fallback body binder, consulted last. Materializes the body as the
/// argument's declared type; a named body argument (`source_name`) selects
/// one field of a structured body.
pub struct BodyBinder;

impl BodyBinder {
    fn body_target(target: TargetType) -> Option<BodyTarget> {
        match target {
            TargetType::Json => Some(BodyTarget::Json),
            TargetType::Text => Some(BodyTarget::Text),
            TargetType::Bytes => Some(BodyTarget::Bytes),
            _ => None,
        }
    }
}

impl ArgumentBinder for BodyBinder {
    fn bind(&self, spec: &ArgumentSpec, request: &mut ExchangeRequest) -> BindingResult {
        let Some(target) = Self::body_target(spec.target) else {
            return BindingResult::Failed(ConversionError::new(
                &spec.name,
                format!("body cannot bind declared type {:?}", spec.target),
            ));
        };
        let has_body = request.content_length().unwrap_or(0) > 0
            || request
                .content_type()
                .map(crate::body::is_form_submission)
                .unwrap_or(false);
        if !has_body {
            return BindingResult::Unsatisfied;
        }
        // A named @Body("field") argument selects from the decoded object.
        if spec.source_name.is_some() && spec.annotation == Some(super::BindingAnnotation::Body) {
            return match request.get_body(BodyTarget::Json) {
                Ok(crate::exchange::DecodedBody::Json(Value::Object(map))) => {
                    match map.get(spec.lookup_name()) {
                        Some(field) => BindingResult::Satisfied(BoundValue::Json(field.clone())),
                        None => BindingResult::Unsatisfied,
                    }
                }
                Ok(_) => BindingResult::Failed(ConversionError::new(
                    &spec.name,
                    "body is not an object; cannot select a field",
                )),
                Err(e) => bind_error(spec, e),
            };
        }
        match request.get_body(target) {
            Ok(decoded) => BindingResult::Satisfied(BoundValue::from_decoded(decoded)),
            Err(e) => bind_error(spec, e),
        }
    }
}

fn bind_error(spec: &ArgumentSpec, error: HttpError) -> BindingResult {
    BindingResult::Failed(ConversionError::new(&spec.name, error.to_string()))
}
