//! Filename sanitization and download-name helpers.
//!
//! Titles supplied by callers end up both on disk and inside fetch-tool
//! output templates, so sanitizing has to satisfy every platform's filename
//! rules and keep the template metacharacter `%` out of the result.

/// Characters that are invalid in Windows filenames, plus the template metacharacter.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '%'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Upper bound on a sanitized stem, leaving room for extensions and job prefixes
/// under the common 255-byte filename limit.
pub const MAX_STEM_BYTES: usize = 200;

/// Sanitize a string for use as a filename stem across all platforms.
///
/// Invalid and control characters become `_` (consecutive replacements
/// collapse), leading/trailing spaces and dots are trimmed, Windows reserved
/// names get a `_` prefix, and the result is cut to [`MAX_STEM_BYTES`] on a
/// character boundary. Returns `"unnamed"` if nothing usable remains.
///
/// # Examples
///
/// ```
/// use fetch_server::utils::filename::sanitize_filename;
///
/// assert_eq!(sanitize_filename("hello?world"), "hello_world");
/// assert_eq!(sanitize_filename("100% AC/DC"), "100_ AC_DC");
/// assert_eq!(sanitize_filename(""), "unnamed");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = truncate_at_char_boundary(
        result.trim_matches(|c| c == ' ' || c == '.'),
        MAX_STEM_BYTES,
    )
    .trim_end_matches(|c| c == ' ' || c == '.');

    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    for reserved in WINDOWS_RESERVED_NAMES {
        if upper == *reserved || upper.starts_with(&format!("{}.", reserved)) {
            return format!("_{}", trimmed);
        }
    }

    trimmed.to_string()
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Build a `Content-Disposition: attachment` value.
///
/// Carries a plain ASCII `filename` for old clients and an RFC 5987
/// `filename*` with the exact UTF-8 name.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

/// MIME type for a delivered artifact, keyed on its extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4" | "m4v") => "video/mp4",
        Some("m4a") => "audio/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("opus" | "ogg") => "audio/ogg",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}
