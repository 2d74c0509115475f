//! Body codecs keyed by media type.
//!
//! The exchange layer decodes buffered request bytes and encodes response
//! drafts through this registry. A missing codec for a declared content
//! type is reported as [`HttpError::UnsupportedMediaType`], distinctly from
//! a codec that matched but failed.

use crate::error::HttpError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Media type constants the adapter layer cares about.
pub mod media {
    pub const APPLICATION_JSON: &str = "application/json";
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
    pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
    pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

    /// The base media type: everything before any `;` parameter, trimmed
    /// and lowercased for comparison.
    pub fn base(content_type: &str) -> String {
        content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }

    /// A named parameter of the media type, e.g. `boundary` or `charset`.
    pub fn parameter<'a>(content_type: &'a str, name: &str) -> Option<&'a str> {
        content_type.split(';').skip(1).find_map(|p| {
            let (k, v) = p.trim().split_once('=')?;
            if k.trim().eq_ignore_ascii_case(name) {
                Some(v.trim().trim_matches('"'))
            } else {
                None
            }
        })
    }
}

/// Decode/encode between raw bytes and the dynamic JSON value currency.
pub trait BodyCodec: Send + Sync {
    /// Base media types this codec handles.
    fn media_types(&self) -> Vec<&'static str>;

    fn decode(&self, bytes: &[u8]) -> Result<Value, HttpError>;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, HttpError>;
}

/// JSON bodies via `serde_json`.
pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn media_types(&self) -> Vec<&'static str> {
        vec![media::APPLICATION_JSON]
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, HttpError> {
        serde_json::from_slice(bytes).map_err(|e| HttpError::Codec {
            media_type: media::APPLICATION_JSON.to_string(),
            message: e.to_string(),
        })
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, HttpError> {
        serde_json::to_vec(value).map_err(|e| HttpError::Codec {
            media_type: media::APPLICATION_JSON.to_string(),
            message: e.to_string(),
        })
    }
}

/// `text/*` bodies as UTF-8 strings.
pub struct TextCodec;

impl BodyCodec for TextCodec {
    fn media_types(&self) -> Vec<&'static str> {
        vec![media::TEXT_PLAIN, "text/html", "text/css", "text/csv"]
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, HttpError> {
        let text = String::from_utf8(bytes.to_vec()).map_err(|e| HttpError::Codec {
            media_type: media::TEXT_PLAIN.to_string(),
            message: e.to_string(),
        })?;
        Ok(Value::String(text))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, HttpError> {
        match value {
            Value::String(s) => Ok(s.clone().into_bytes()),
            other => Ok(other.to_string().into_bytes()),
        }
    }
}

/// Codec lookup by base media type. Built once at handler start and treated
/// as immutable thereafter.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    by_media_type: HashMap<String, Arc<dyn BodyCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the JSON and text codecs.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonCodec));
        registry.register(Arc::new(TextCodec));
        registry
    }

    pub fn register(&mut self, codec: Arc<dyn BodyCodec>) {
        for media_type in codec.media_types() {
            self.by_media_type.insert(media_type.to_string(), codec.clone());
        }
    }

    /// Find a codec for the given content type, matching on the base media
    /// type (parameters ignored).
    pub fn find(&self, content_type: &str) -> Option<&Arc<dyn BodyCodec>> {
        self.by_media_type.get(&media::base(content_type))
    }

    /// Like [`CodecRegistry::find`] but reports the unsupported media type.
    pub fn require(&self, content_type: &str) -> Result<&Arc<dyn BodyCodec>, HttpError> {
        self.find(content_type)
            .ok_or_else(|| HttpError::UnsupportedMediaType(media::base(content_type)))
    }

    pub fn len(&self) -> usize {
        self.by_media_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_media_type.is_empty()
    }
}
