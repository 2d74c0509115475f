//! Engine-neutral form parameter machinery.
//!
//! None of the three engines parses request parameters natively, so form
//! submissions that a full-featured container would own are handled here:
//! urlencoded bodies via `url::form_urlencoded` and `multipart/form-data`
//! via a boundary scan over the cursor buffer.

use crate::buffer::ByteBuf;
use crate::codec::media;
use crate::error::{HttpError, MultipartError};
use crate::multipart::CompletedUpload;
use crate::server::config::MultipartLimits;
use tracing::debug;

/// Decode an `application/x-www-form-urlencoded` body into ordered pairs.
pub fn parse_urlencoded(bytes: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(bytes)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Advance the reader cursor to the next occurrence of `needle`, using the
/// buffer's first-byte scan as the accelerator. Returns the absolute index.
fn seek(cursor: &mut ByteBuf, needle: &[u8]) -> Option<usize> {
    let first = *needle.first()?;
    loop {
        let idx = cursor.index_of(first)?;
        cursor.set_reader_index(idx).ok()?;
        if cursor.readable().starts_with(needle) {
            return Some(idx);
        }
        cursor.set_reader_index(idx + 1).ok()?;
    }
}

/// A parameter of a `Content-Disposition` value, quotes stripped.
fn disposition_param<'a>(disposition: &'a str, name: &str) -> Option<&'a str> {
    disposition.split(';').skip(1).find_map(|p| {
        let (k, v) = p.trim().split_once('=')?;
        if k.trim().eq_ignore_ascii_case(name) {
            Some(v.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// Parse a complete `multipart/form-data` body into completed parts,
/// enforcing the configured limits.
pub fn parse_multipart(
    bytes: &[u8],
    content_type: &str,
    limits: &MultipartLimits,
) -> Result<Vec<CompletedUpload>, HttpError> {
    let boundary = media::parameter(content_type, "boundary")
        .ok_or(MultipartError::MissingBoundary)?
        .to_string();
    let dash_boundary = format!("--{boundary}").into_bytes();

    let mut cursor = ByteBuf::new(bytes.to_vec());
    let mut parts = Vec::new();
    let mut total_bytes = 0usize;

    // Skip any preamble before the first boundary.
    let first = seek(&mut cursor, &dash_boundary)
        .ok_or(MultipartError::Malformed("missing opening boundary"))?;
    let mut position = first + dash_boundary.len();

    loop {
        let tail = cursor
            .slice(position, cursor.writer_index() - position)
            .map_err(HttpError::Buffer)?;
        if tail.starts_with(b"--") {
            break;
        }
        if !tail.starts_with(b"\r\n") {
            return Err(MultipartError::Malformed("boundary not followed by CRLF").into());
        }
        let headers_start = position + 2;

        cursor
            .set_reader_index(headers_start)
            .map_err(HttpError::Buffer)?;
        let headers_end = seek(&mut cursor, b"\r\n\r\n")
            .ok_or(MultipartError::Malformed("part headers not terminated"))?;
        let header_block = cursor
            .slice(headers_start, headers_end - headers_start)
            .map_err(HttpError::Buffer)?;
        let header_text = String::from_utf8_lossy(header_block).to_string();

        let mut name = None;
        let mut filename = None;
        let mut part_content_type = None;
        for line in header_text.split("\r\n") {
            let Some((header_name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if header_name.eq_ignore_ascii_case("content-disposition") {
                name = disposition_param(value, "name").map(str::to_string);
                filename = disposition_param(value, "filename").map(str::to_string);
            } else if header_name.eq_ignore_ascii_case("content-type") {
                part_content_type = Some(value.to_string());
            }
        }
        let name = name.ok_or(MultipartError::Malformed("part without a field name"))?;

        let content_start = headers_end + 4;
        cursor
            .set_reader_index(content_start)
            .map_err(HttpError::Buffer)?;
        let closing = format!("\r\n--{boundary}").into_bytes();
        let content_end = seek(&mut cursor, &closing)
            .ok_or(MultipartError::Malformed("part content not terminated"))?;
        let content = cursor
            .slice(content_start, content_end - content_start)
            .map_err(HttpError::Buffer)?
            .to_vec();

        if content.len() > limits.max_part_size {
            return Err(MultipartError::PartTooLarge {
                name,
                size: content.len(),
                max: limits.max_part_size,
            }
            .into());
        }
        total_bytes += content.len();
        if total_bytes > limits.max_request_size {
            return Err(MultipartError::RequestTooLarge {
                size: total_bytes,
                max: limits.max_request_size,
            }
            .into());
        }
        if parts.len() + 1 > limits.max_parts {
            return Err(MultipartError::TooManyParts {
                max: limits.max_parts,
            }
            .into());
        }

        debug!(part = %name, bytes = content.len(), "multipart part parsed");
        parts.push(CompletedUpload::new(name, filename, part_content_type, content));
        position = content_end + closing.len();
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = "multipart/form-data; boundary=XYZ";

    fn body(parts: &[(&str, Option<&str>, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, filename, content_type, content) in parts {
            out.extend_from_slice(b"--XYZ\r\n");
            let mut disposition = format!("Content-Disposition: form-data; name=\"{name}\"");
            if let Some(filename) = filename {
                disposition.push_str(&format!("; filename=\"{filename}\""));
            }
            out.extend_from_slice(disposition.as_bytes());
            out.extend_from_slice(b"\r\n");
            if let Some(ct) = content_type {
                out.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(content);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"--XYZ--\r\n");
        out
    }

    #[test]
    fn test_parse_urlencoded_pairs() {
        let pairs = parse_urlencoded(b"a=1&b=two%20words&a=3");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two words".to_string()),
                ("a".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_multipart_fields_and_file() {
        let bytes = body(&[
            ("note", None, None, b"hello"),
            ("upload", Some("a.txt"), Some("text/plain"), b"file\r\ncontent"),
        ]);
        let parts = parse_multipart(&bytes, CT, &MultipartLimits::default()).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name(), "note");
        assert_eq!(parts[0].text().as_deref(), Some("hello"));
        assert_eq!(parts[1].filename(), Some("a.txt"));
        assert_eq!(parts[1].content_type(), Some("text/plain"));
        assert_eq!(parts[1].bytes(), b"file\r\ncontent");
    }

    #[test]
    fn test_missing_boundary_parameter() {
        let err = parse_multipart(b"", "multipart/form-data", &MultipartLimits::default())
            .unwrap_err();
        assert!(matches!(
            err,
            HttpError::Multipart(MultipartError::MissingBoundary)
        ));
    }

    #[test]
    fn test_part_size_limit() {
        let bytes = body(&[("big", None, None, &[b'x'; 64])]);
        let limits = MultipartLimits {
            max_part_size: 16,
            ..MultipartLimits::default()
        };
        let err = parse_multipart(&bytes, CT, &limits).unwrap_err();
        assert!(matches!(
            err,
            HttpError::Multipart(MultipartError::PartTooLarge { max: 16, .. })
        ));
    }

    #[test]
    fn test_request_size_limit_sums_parts() {
        // Each part is within the per-part limit; together they exceed the
        // aggregate request limit.
        let bytes = body(&[
            ("a", None, None, &[b'x'; 10]),
            ("b", None, None, &[b'y'; 10]),
        ]);
        let limits = MultipartLimits {
            max_part_size: 64,
            max_request_size: 16,
            max_parts: 10,
        };
        let err = parse_multipart(&bytes, CT, &limits).unwrap_err();
        assert!(matches!(
            err,
            HttpError::Multipart(MultipartError::RequestTooLarge { size: 20, max: 16 })
        ));

        // At exactly the limit the parts parse fine.
        let limits = MultipartLimits {
            max_part_size: 64,
            max_request_size: 20,
            max_parts: 10,
        };
        assert_eq!(parse_multipart(&bytes, CT, &limits).unwrap().len(), 2);
    }

    #[test]
    fn test_part_count_limit() {
        let bytes = body(&[("a", None, None, b"1"), ("b", None, None, b"2")]);
        let limits = MultipartLimits {
            max_parts: 1,
            ..MultipartLimits::default()
        };
        let err = parse_multipart(&bytes, CT, &limits).unwrap_err();
        assert!(matches!(
            err,
            HttpError::Multipart(MultipartError::TooManyParts { max: 1 })
        ));
    }
}
