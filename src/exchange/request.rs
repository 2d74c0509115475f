//! The application-facing request wrapper.
//!
//! Wraps one native request behind [`RawRequest`]. Header, parameter,
//! cookie and attribute access are pure reads; the body is materialized
//! through exactly one path, tracked by an explicit state tag so re-entrant
//! or repeated reads are detected instead of silently returning empty data.

use crate::body::RawBody;
use crate::codec::{media, CodecRegistry};
use crate::cookies::CookieJar;
use crate::error::{HttpError, LifecycleError};
use crate::headers::Headers;
use crate::multipart::CompletedUpload;
use crate::server::config::MultipartLimits;
use crate::server::form;
use crate::server::raw::{RawRequest, RequestHead};
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Well-known request attribute keys.
pub mod attrs {
    /// Path parameters installed by the external router, as a JSON object.
    pub const PATH_PARAMS: &str = "portico.path_params";
}

/// Body materialization state. `Reading` marks an in-flight read so
/// concurrent or re-entrant materialization attempts fail deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Unread,
    Reading,
    Materialized,
}

/// Concrete representations a body can be materialized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyTarget {
    Json,
    Text,
    Bytes,
}

/// A body decoded as one concrete representation.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

pub struct ExchangeRequest {
    raw: Box<dyn RawRequest>,
    cookies: CookieJar,
    attributes: HashMap<String, Value>,
    body_state: BodyState,
    /// Whether the native stream was pulled; it is pulled at most once.
    native_read: bool,
    /// The representation chosen by the body builder.
    raw_body: Option<RawBody>,
    /// Byte holder filled by `buffer_contents`, shared and immutable.
    buffered: Option<Arc<[u8]>>,
    /// Parsed-body cache keyed by the materialized representation.
    decoded: HashMap<BodyTarget, DecodedBody>,
    /// Form parameters parsed by the engine-neutral machinery, merged over
    /// the query string on access.
    form_params: Option<Vec<(String, String)>>,
    uploads: Option<Vec<CompletedUpload>>,
    codecs: Arc<CodecRegistry>,
    multipart_limits: MultipartLimits,
}

impl ExchangeRequest {
    pub(crate) fn new(
        raw: Box<dyn RawRequest>,
        codecs: Arc<CodecRegistry>,
        multipart_limits: MultipartLimits,
    ) -> Self {
        let cookies = CookieJar::from_header_values(raw.head().headers.get_all("cookie"));
        Self {
            raw,
            cookies,
            attributes: HashMap::new(),
            body_state: BodyState::Unread,
            native_read: false,
            raw_body: None,
            buffered: None,
            decoded: HashMap::new(),
            form_params: None,
            uploads: None,
            codecs,
            multipart_limits,
        }
    }

    pub fn method(&self) -> &Method {
        &self.raw.head().method
    }

    pub fn uri(&self) -> &str {
        &self.raw.head().uri
    }

    pub fn path(&self) -> &str {
        self.raw.head().path()
    }

    pub fn headers(&self) -> &Headers {
        &self.raw.head().headers
    }

    pub fn head(&self) -> &RequestHead {
        self.raw.head()
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.raw.head().remote_addr
    }

    pub fn content_type(&self) -> Option<&str> {
        self.raw.head().content_type()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.raw.head().content_length()
    }

    pub fn character_encoding(&self) -> String {
        self.raw.head().character_encoding()
    }

    pub fn locale(&self) -> Option<String> {
        self.raw.head().locale()
    }

    pub fn async_supported(&self) -> bool {
        self.raw.async_supported()
    }

    /// Mutable cross-stage state scoped to this request.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// A path parameter installed by the external router.
    pub fn path_param(&self, name: &str) -> Option<String> {
        self.attributes
            .get(attrs::PATH_PARAMS)
            .and_then(|v| v.get(name))
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Query parameter, last occurrence wins.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.raw.head().query_param(name)
    }

    /// Request parameters: form fields (for form submissions) merged over
    /// the query string, form fields winning on collision.
    pub fn parameter(&mut self, name: &str) -> Result<Option<String>, HttpError> {
        if self.is_form() {
            if let Some((_, value)) = self
                .form_fields()?
                .iter()
                .rev()
                .find(|(k, _)| k.as_str() == name)
            {
                return Ok(Some(value.clone()));
            }
        }
        Ok(self.raw.head().query_param(name))
    }

    /// All parameters as a JSON object, used when a body argument binds a
    /// form submission wholesale.
    pub fn parameters_as_value(&mut self) -> Result<Value, HttpError> {
        let mut map = serde_json::Map::new();
        for (k, v) in self.raw.head().query_params() {
            map.insert(k, Value::String(v));
        }
        if self.is_form() {
            for (k, v) in self.form_fields()? {
                map.insert(k.clone(), Value::String(v.clone()));
            }
        }
        Ok(Value::Object(map))
    }

    fn is_form(&self) -> bool {
        self.content_type().map(crate::body::is_form_submission).unwrap_or(false)
    }

    fn is_multipart(&self) -> bool {
        self.content_type()
            .map(|ct| media::base(ct) == media::MULTIPART_FORM_DATA)
            .unwrap_or(false)
    }

    /// Run the body builder once, choosing the representation for this
    /// request's content type and pulling the lazy source at most once.
    fn materialize(&mut self) -> Result<(), HttpError> {
        if self.raw_body.is_some() {
            return Ok(());
        }
        if self.body_state == BodyState::Reading {
            return Err(LifecycleError::ReentrantBodyRead.into());
        }
        self.body_state = BodyState::Reading;
        let head = self.raw.head().clone();
        let raw = &mut self.raw;
        let native_read = &mut self.native_read;
        let mut lazy = crate::body::LazyBody::new(move || {
            *native_read = true;
            raw.read_body()
        });
        match crate::body::build_body(&mut lazy, &head) {
            Ok(body) => {
                if let RawBody::Bytes(buf) = &body {
                    debug!(bytes = buf.readable_bytes(), "request body buffered");
                    self.buffered = Some(buf.to_vec().into());
                }
                self.raw_body = Some(body);
                self.body_state = BodyState::Materialized;
                Ok(())
            }
            Err(e) => {
                // Partial bytes are discarded; the native stream stays
                // consumed, so a retry surfaces the engine's own error.
                self.body_state = BodyState::Unread;
                Err(e)
            }
        }
    }

    /// Eagerly read the full body into the internal byte holder, exactly
    /// once. Idempotent: repeat calls return the cached bytes bit-identical.
    pub fn buffer_contents(&mut self) -> Result<Arc<[u8]>, HttpError> {
        if let Some(bytes) = &self.buffered {
            return Ok(bytes.clone());
        }
        self.materialize()?;
        if let Some(bytes) = &self.buffered {
            return Ok(bytes.clone());
        }
        // The builder deferred (form submission) or saw no declared
        // content; pull the native stream now, still at most once.
        let bytes: Arc<[u8]> = if self.native_read {
            Vec::new().into()
        } else {
            self.native_read = true;
            self.raw.read_body()?.into()
        };
        self.buffered = Some(bytes.clone());
        Ok(bytes)
    }

    /// Resolve the body as `target`, consulting the parsed-body cache first
    /// and caching the decoded value on success.
    pub fn get_body(&mut self, target: BodyTarget) -> Result<DecodedBody, HttpError> {
        if let Some(cached) = self.decoded.get(&target) {
            return Ok(cached.clone());
        }
        let decoded = if self.is_form() && target == BodyTarget::Json {
            // Form submissions bind as their parameter map.
            DecodedBody::Json(self.parameters_as_value()?)
        } else {
            let bytes = self.buffer_contents()?;
            match target {
                BodyTarget::Bytes => DecodedBody::Bytes(bytes.to_vec()),
                BodyTarget::Text => {
                    let text = String::from_utf8(bytes.to_vec()).map_err(|e| HttpError::Codec {
                        media_type: self
                            .content_type()
                            .map(media::base)
                            .unwrap_or_else(|| media::TEXT_PLAIN.to_string()),
                        message: e.to_string(),
                    })?;
                    DecodedBody::Text(text)
                }
                BodyTarget::Json => {
                    let content_type = self
                        .content_type()
                        .map(str::to_string)
                        .unwrap_or_else(|| media::APPLICATION_JSON.to_string());
                    let codec = self.codecs.require(&content_type)?;
                    DecodedBody::Json(codec.decode(&bytes)?)
                }
            }
        };
        self.decoded.insert(target, decoded.clone());
        Ok(decoded)
    }

    /// Completed multipart parts, parsed once through the engine-neutral
    /// machinery and cached.
    pub fn uploads(&mut self) -> Result<&[CompletedUpload], HttpError> {
        if self.uploads.is_none() {
            if !self.is_multipart() {
                self.uploads = Some(Vec::new());
            } else {
                let content_type = self
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_default();
                let bytes = self.buffer_contents()?;
                let parts =
                    form::parse_multipart(&bytes, &content_type, &self.multipart_limits)?;
                self.uploads = Some(parts);
            }
        }
        Ok(self.uploads.as_deref().unwrap_or_default())
    }

    /// One completed part by field name, last occurrence winning.
    pub fn upload(&mut self, name: &str) -> Result<Option<CompletedUpload>, HttpError> {
        Ok(self
            .uploads()?
            .iter()
            .rev()
            .find(|p| p.name() == name)
            .cloned())
    }

    fn form_fields(&mut self) -> Result<&Vec<(String, String)>, HttpError> {
        if self.form_params.is_none() {
            let fields = if self.is_multipart() {
                self.uploads()?
                    .iter()
                    .filter(|p| p.filename().is_none())
                    .filter_map(|p| p.text().map(|t| (p.name().to_string(), t)))
                    .collect()
            } else {
                let bytes = self.buffer_contents()?;
                form::parse_urlencoded(&bytes)
            };
            self.form_params = Some(fields);
        }
        Ok(self.form_params.as_ref().unwrap_or(&EMPTY_FIELDS))
    }
}

static EMPTY_FIELDS: Vec<(String, String)> = Vec::new();
