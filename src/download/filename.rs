//! Filename resolution for downloaded archives.
//!
//! # Overview
//!
//! Picks an on-disk name for a payload in priority order:
//!
//! 1. The `Content-Disposition` response header, when it names a file.
//! 2. The last path segment of the download URL.
//! 3. A deterministic fallback derived from a hash of the URL.
//!
//! Whatever the source, the name is sanitized for the local filesystem and
//! given an archive extension when it lacks one.

use sha2::{Digest, Sha256};
use url::Url;

/// Maximum length of a sanitized filename component.
const MAX_NAME_LEN: usize = 100;

/// Archive extensions the extractor understands (lowercase, with dot).
pub const ARCHIVE_EXTENSIONS: &[&str] = &[".zip", ".rar", ".7z"];

/// Sanitizes a string for use as a filename or directory component.
///
/// Replaces filesystem-reserved characters and control characters with `_`,
/// truncates to 100 characters, and trims leading/trailing dots and spaces.
/// Returns `"unnamed"` when nothing survives.
#[must_use]
pub fn sanitize_name(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .map(|c| {
            if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    if cleaned.chars().count() > MAX_NAME_LEN {
        cleaned = cleaned.chars().take(MAX_NAME_LEN).collect();
    }

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extracts a filename from a `Content-Disposition` header value.
///
/// Handles both the plain `filename="name.zip"` form and the RFC 5987
/// `filename*=UTF-8''name.zip` form (the starred form wins when both are
/// present, matching how servers intend it).
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("filename*=") {
            let value = value.trim_matches('"');
            let encoded = value.split_once("''").map_or(value, |(_, rest)| rest);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                let name = sanitize_name(&decoded);
                if name != "unnamed" {
                    return Some(name);
                }
            }
        }
    }

    for part in header.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("filename=") {
            let name = sanitize_name(value.trim_matches('"'));
            if name != "unnamed" {
                return Some(name);
            }
        }
    }

    None
}

/// Extracts a usable filename from the last path segment of a URL.
///
/// Returns `None` for empty segments (e.g. a bare trailing slash).
#[must_use]
pub fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment).ok()?;
    let name = sanitize_name(&decoded);
    if name == "unnamed" {
        None
    } else {
        Some(name)
    }
}

/// Returns true when the name ends with a recognized archive extension.
#[must_use]
pub fn has_archive_extension(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ARCHIVE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Maps a Content-Type header value to an archive extension.
///
/// Unknown or missing types default to `.zip`, the dominant format for the
/// catalogs this tool targets.
#[must_use]
pub fn extension_from_content_type(content_type: Option<&str>) -> &'static str {
    match content_type.map(str::to_ascii_lowercase).as_deref() {
        Some(ct) if ct.contains("x-rar") || ct.contains("vnd.rar") => ".rar",
        Some(ct) if ct.contains("x-7z") => ".7z",
        _ => ".zip",
    }
}

/// Deterministic fallback filename for a URL with no usable name:
/// `item_` + the first 8 hex characters of the URL's SHA-256.
#[must_use]
pub fn fallback_filename(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hash8: String = digest
        .iter()
        .take(4)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    format!("item_{hash8}.zip")
}

/// Resolves the final on-disk filename for a payload.
///
/// `content_disposition` and `content_type` come from the fetch response;
/// the URL is the fallback source. The result always carries an archive
/// extension.
#[must_use]
pub fn resolve_filename(
    url: &Url,
    content_disposition: Option<&str>,
    content_type: Option<&str>,
) -> String {
    let candidate = content_disposition
        .and_then(parse_content_disposition)
        .or_else(|| filename_from_url(url));

    match candidate {
        Some(name) if has_archive_extension(&name) => name,
        Some(name) => format!("{name}{}", extension_from_content_type(content_type)),
        None => fallback_filename(url.as_str()),
    }
}
