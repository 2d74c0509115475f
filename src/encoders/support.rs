//! Behavior shared by every file encoder: conditional-request handling,
//! date and cache headers, and content-type resolution.

use crate::exchange::{ExchangeRequest, ExchangeResponse};
use crate::httpdate;

/// Seconds a served file stays fresh for downstream caches.
const CACHE_SECONDS: u64 = 60;

/// Content type from the filename extension, generic binary fallback.
pub fn content_type_for_name(name: &str) -> &'static str {
    let extension = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match extension.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "yaml" | "yml" => "text/yaml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Content type by declared media type metadata, else filename extension,
/// else generic binary.
pub fn resolve_content_type(declared: Option<&str>, name: &str) -> String {
    declared
        .map(str::to_string)
        .unwrap_or_else(|| content_type_for_name(name).to_string())
}

/// True when the client's cached copy is still current: the request carries
/// an `If-Modified-Since` at or after the resource's last-modified time.
pub fn is_not_modified(request: &ExchangeRequest, last_modified: Option<u64>) -> bool {
    let Some(last_modified) = last_modified else {
        return false;
    };
    request
        .headers()
        .get("if-modified-since")
        .and_then(httpdate::parse_http_date)
        .map(|since| since >= last_modified)
        .unwrap_or(false)
}

/// Set `Date`, `Expires`, `Cache-Control` and `Last-Modified` on the draft,
/// leaving any caller-set values alone.
pub fn set_date_and_cache_headers(response: &mut ExchangeResponse, last_modified: Option<u64>) {
    let now = httpdate::unix_now();
    let _ = response.set_header("Date", httpdate::format_http_date(now));
    if !response.headers().contains("expires") {
        let _ = response.set_header("Expires", httpdate::format_http_date(now + CACHE_SECONDS));
    }
    if !response.headers().contains("cache-control") {
        let _ = response.set_header("Cache-Control", format!("private, max-age={CACHE_SECONDS}"));
    }
    if let Some(last_modified) = last_modified {
        if !response.headers().contains("last-modified") {
            let _ = response.set_header("Last-Modified", httpdate::format_http_date(last_modified));
        }
    }
}

/// Last-modified time of a filesystem path as epoch seconds.
pub fn file_last_modified(path: &std::path::Path) -> Option<u64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_inference() {
        assert_eq!(content_type_for_name("index.html"), "text/html");
        assert_eq!(content_type_for_name("logo.SVG"), "image/svg+xml");
        assert_eq!(content_type_for_name("blob.bin"), "application/octet-stream");
        assert_eq!(content_type_for_name("no_extension"), "application/octet-stream");
    }

    #[test]
    fn test_declared_media_type_wins() {
        assert_eq!(
            resolve_content_type(Some("application/wasm"), "module.bin"),
            "application/wasm"
        );
        assert_eq!(resolve_content_type(None, "style.css"), "text/css");
    }
}
