//! Engine-neutral server configuration.
//!
//! Deserialized from a YAML `config.yaml`, with environment overrides for
//! runtime knobs.

use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_https_port() -> u16 {
    8443
}

/// TLS settings. Presence of an enabled block switches the reported scheme
/// to `https` and the default port to the HTTPS port; certificate and key
/// paths are validated at startup. Actual termination is delegated to the
/// engine build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SslConfig {
    #[serde(default)]
    pub enabled: bool,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    #[serde(default = "default_https_port")]
    pub port: u16,
}

fn default_max_part_size() -> usize {
    10 * 1024 * 1024
}

fn default_max_request_size() -> usize {
    50 * 1024 * 1024
}

fn default_max_parts() -> usize {
    100
}

/// Multipart size limits enforced by the engine-neutral parameter
/// machinery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartLimits {
    /// Maximum size of one part in bytes.
    #[serde(default = "default_max_part_size")]
    pub max_part_size: usize,
    /// Maximum size of all parts combined, in bytes.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    /// Maximum number of parts.
    #[serde(default = "default_max_parts")]
    pub max_parts: usize,
}

impl Default for MultipartLimits {
    fn default() -> Self {
        Self {
            max_part_size: default_max_part_size(),
            max_request_size: default_max_request_size(),
            max_parts: default_max_parts(),
        }
    }
}

/// The two static-resource path kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRoot {
    /// `file:` prefix — rooted anywhere on the filesystem.
    Filesystem(PathBuf),
    /// `res:` prefix — rooted under the configured resource base
    /// directory shipped alongside the binary.
    Bundle(PathBuf),
}

/// One static-resource mapping: requests matching the mapping prefix are
/// served from the listed roots without reaching the handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticResourceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// URL mapping, e.g. `/static/**`.
    pub mapping: String,
    /// Roots with `file:` or `res:` prefixes.
    pub paths: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl StaticResourceConfig {
    /// The mapping prefix with any `/**` suffix stripped.
    pub fn prefix(&self) -> &str {
        self.mapping.trim_end_matches("/**").trim_end_matches('*')
    }

    /// Resolve the configured path strings against `resource_base`.
    pub fn roots(&self, resource_base: &Path) -> Result<Vec<ResourceRoot>, ServerError> {
        self.paths
            .iter()
            .map(|p| {
                if let Some(rest) = p.strip_prefix("file:") {
                    Ok(ResourceRoot::Filesystem(PathBuf::from(rest)))
                } else if let Some(rest) = p.strip_prefix("res:") {
                    Ok(ResourceRoot::Bundle(resource_base.join(rest)))
                } else {
                    Err(ServerError::Engine(format!(
                        "static resource path '{p}' must start with 'file:' or 'res:'"
                    )))
                }
            })
            .collect()
    }
}

/// Engine-neutral server configuration consumed by every adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind; `0` requests any free port, and the adapter reports
    /// the actually bound value after start.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix stripped from every request path before dispatch.
    #[serde(default)]
    pub context_path: Option<String>,
    #[serde(default)]
    pub ssl: Option<SslConfig>,
    #[serde(default)]
    pub multipart: MultipartLimits,
    /// Maximum request body size in bytes; `None` means unlimited.
    #[serde(default)]
    pub max_body_size: Option<usize>,
    #[serde(default)]
    pub static_resources: Vec<StaticResourceConfig>,
    /// Base directory for `res:` static roots. Defaults to `./resources`.
    #[serde(default)]
    pub resource_base: Option<PathBuf>,
    /// Engine-specific extra options, passed through opaquely.
    #[serde(default)]
    pub engine_options: HashMap<String, String>,
    /// Serve `SystemFile` responses as streams instead of whole files.
    #[serde(default)]
    pub async_file_serving: bool,
    /// Worker threads for engines that pull requests off a shared queue.
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            context_path: None,
            ssl: None,
            multipart: MultipartLimits::default(),
            max_body_size: None,
            static_resources: Vec::new(),
            resource_base: None,
            engine_options: HashMap::new(),
            async_file_serving: false,
            worker_threads: None,
        }
    }
}

impl ServerConfig {
    /// Load from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_yaml::from_str(&text)
            .map_err(|e| ServerError::Engine(format!("invalid server config: {e}")))
    }

    /// Whether TLS is enabled, after validating the certificate material.
    pub fn validate_ssl(&self) -> Result<bool, ServerError> {
        let Some(ssl) = &self.ssl else {
            return Ok(false);
        };
        if !ssl.enabled {
            return Ok(false);
        }
        for (label, path) in [("certificate", &ssl.cert_path), ("key", &ssl.key_path)] {
            match path {
                Some(p) if p.exists() => {}
                Some(p) => {
                    return Err(ServerError::Tls(format!(
                        "{label} file {} does not exist",
                        p.display()
                    )))
                }
                None => return Err(ServerError::Tls(format!("missing {label} path"))),
            }
        }
        Ok(true)
    }

    /// The scheme the server reports, driven by the TLS block.
    pub fn scheme(&self) -> &'static str {
        match &self.ssl {
            Some(ssl) if ssl.enabled => "https",
            _ => "http",
        }
    }

    /// The configured bind port, honoring the HTTPS port when TLS is on.
    pub fn configured_port(&self) -> u16 {
        match &self.ssl {
            Some(ssl) if ssl.enabled => ssl.port,
            _ => self.port,
        }
    }

    pub fn resource_base(&self) -> PathBuf {
        self.resource_base
            .clone()
            .unwrap_or_else(|| PathBuf::from("resources"))
    }

    /// The request path with the context path stripped, or `None` when the
    /// request falls outside the context.
    pub fn strip_context<'a>(&self, path: &'a str) -> Option<&'a str> {
        match self.context_path.as_deref() {
            None | Some("") | Some("/") => Some(path),
            Some(context) => {
                let rest = path.strip_prefix(context)?;
                if rest.is_empty() {
                    Some("/")
                } else if rest.starts_with('/') {
                    Some(rest)
                } else {
                    None
                }
            }
        }
    }
}

/// Runtime knobs loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Coroutine stack size in bytes for the coroutine engine.
    pub stack_size: usize,
}

impl RuntimeConfig {
    /// Reads `PORTICO_STACK_SIZE` (decimal or `0x` hex), defaulting to 64 KiB.
    pub fn from_env() -> Self {
        let stack_size = match env::var("PORTICO_STACK_SIZE") {
            Ok(val) => {
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).unwrap_or(0x10000)
                } else {
                    val.parse().unwrap_or(0x10000)
                }
            }
            Err(_) => 0x10000,
        };
        RuntimeConfig { stack_size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.scheme(), "http");
        assert_eq!(config.configured_port(), 8080);
    }

    #[test]
    fn test_ssl_switches_scheme_and_port() {
        let mut config = ServerConfig::default();
        config.ssl = Some(SslConfig {
            enabled: true,
            cert_path: None,
            key_path: None,
            port: 8443,
        });
        assert_eq!(config.scheme(), "https");
        assert_eq!(config.configured_port(), 8443);
        assert!(config.validate_ssl().is_err());
    }

    #[test]
    fn test_context_path_stripping() {
        let mut config = ServerConfig::default();
        config.context_path = Some("/api".to_string());
        assert_eq!(config.strip_context("/api/users"), Some("/users"));
        assert_eq!(config.strip_context("/api"), Some("/"));
        assert_eq!(config.strip_context("/apix/users"), None);
        assert_eq!(config.strip_context("/other"), None);
    }

    #[test]
    fn test_static_resource_path_kinds() {
        let sr = StaticResourceConfig {
            enabled: true,
            mapping: "/static/**".to_string(),
            paths: vec!["file:/var/www".to_string(), "res:public".to_string()],
        };
        assert_eq!(sr.prefix(), "/static");
        let roots = sr.roots(Path::new("resources")).unwrap();
        assert_eq!(roots[0], ResourceRoot::Filesystem(PathBuf::from("/var/www")));
        assert_eq!(roots[1], ResourceRoot::Bundle(PathBuf::from("resources/public")));
        assert!(StaticResourceConfig {
            enabled: true,
            mapping: "/s/**".to_string(),
            paths: vec!["classpath:oops".to_string()],
        }
        .roots(Path::new("r"))
        .is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
host: 0.0.0.0
port: 0
context_path: /api
multipart:
  max_part_size: 1024
  max_parts: 4
engine_options:
  keep_alive: "true"
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 0);
        assert_eq!(config.multipart.max_part_size, 1024);
        assert_eq!(config.multipart.max_parts, 4);
        // Omitted limit fields fall back to their defaults.
        assert_eq!(config.multipart.max_request_size, 50 * 1024 * 1024);
        assert_eq!(config.engine_options.get("keep_alive").map(String::as_str), Some("true"));
    }
}
