//! Static resource resolution shared by the engine adapters.
//!
//! Requests matching a configured mapping are served directly by the
//! engine, without ever reaching the handler. Path traversal outside the
//! configured roots is rejected during mapping.

use crate::encoders::support::content_type_for_name;
use crate::error::ServerError;
use crate::server::config::{ResourceRoot, ServerConfig};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

struct Mapping {
    prefix: String,
    roots: Vec<PathBuf>,
}

/// Resolves request paths against the configured static mappings.
pub struct StaticResolver {
    mappings: Vec<Mapping>,
}

impl StaticResolver {
    pub fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let base = config.resource_base();
        let mut mappings = Vec::new();
        for sr in &config.static_resources {
            if !sr.enabled {
                continue;
            }
            let roots = sr
                .roots(&base)?
                .into_iter()
                .map(|root| match root {
                    ResourceRoot::Filesystem(p) | ResourceRoot::Bundle(p) => p,
                })
                .collect();
            mappings.push(Mapping {
                prefix: sr.prefix().to_string(),
                roots,
            });
        }
        Ok(Self { mappings })
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Join a relative URL path onto a root, rejecting any component that
    /// would escape it.
    fn map_path(root: &Path, url_path: &str) -> Option<PathBuf> {
        let mut pb = root.to_path_buf();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    /// Resolve a request path to file content and content type. `None`
    /// means the request is not a static hit and proceeds to the handler.
    pub fn resolve(&self, path: &str) -> Option<(Vec<u8>, &'static str)> {
        for mapping in &self.mappings {
            let rest = match path.strip_prefix(&mapping.prefix) {
                Some(rest) => rest.trim_start_matches('/'),
                None => continue,
            };
            let rest = if rest.is_empty() { "index.html" } else { rest };
            for root in &mapping.roots {
                let Some(file) = Self::map_path(root, rest) else {
                    continue;
                };
                if !file.is_file() {
                    continue;
                }
                match std::fs::read(&file) {
                    Ok(bytes) => {
                        debug!(path = %file.display(), bytes = bytes.len(), "static resource served");
                        return Some((bytes, content_type_for_name(rest)));
                    }
                    Err(_) => continue,
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::StaticResourceConfig;
    use std::fs;

    fn config_with(dir: &Path) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.static_resources = vec![StaticResourceConfig {
            enabled: true,
            mapping: "/static/**".to_string(),
            paths: vec![format!("file:{}", dir.display())],
        }];
        config
    }

    #[test]
    fn test_resolve_and_miss() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), "Hi\n").unwrap();
        let resolver = StaticResolver::from_config(&config_with(dir.path())).unwrap();
        let (bytes, ct) = resolver.resolve("/static/hello.txt").unwrap();
        assert_eq!(bytes, b"Hi\n");
        assert_eq!(ct, "text/plain");
        assert!(resolver.resolve("/static/missing.txt").is_none());
        assert!(resolver.resolve("/other/hello.txt").is_none());
    }

    #[test]
    fn test_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("public");
        fs::create_dir(&inner).unwrap();
        fs::write(dir.path().join("secret.txt"), "no").unwrap();
        let resolver = StaticResolver::from_config(&config_with(&inner)).unwrap();
        assert!(resolver.resolve("/static/../secret.txt").is_none());
    }

    #[test]
    fn test_index_html_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>Home</h1>").unwrap();
        let resolver = StaticResolver::from_config(&config_with(dir.path())).unwrap();
        let (bytes, ct) = resolver.resolve("/static/").unwrap();
        assert_eq!(ct, "text/html");
        assert_eq!(bytes, b"<h1>Home</h1>");
    }
}
