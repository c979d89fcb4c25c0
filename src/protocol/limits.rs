//! Input limits
//!
//! Display names and chat content are validated here before they reach the
//! registry or the fan-out engine. Lengths are counted in characters, not
//! bytes.

/// Longest accepted display name, in characters
pub const MAX_USERNAME_CHARS: usize = 20;

/// Longest accepted chat message, in characters
pub const MAX_CONTENT_CHARS: usize = 500;

/// Normalize a proposed display name
///
/// Trims surrounding whitespace and lower-cases the result. Returns `None`
/// when the normalized name is empty, longer than [`MAX_USERNAME_CHARS`], or
/// contains anything other than ASCII letters and digits.
pub fn normalize_username(raw: &str) -> Option<String> {
    let trimmed = raw.trim();

    if trimmed.is_empty() || trimmed.chars().count() > MAX_USERNAME_CHARS {
        return None;
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

/// Check chat content length
pub fn is_valid_content(content: &str) -> bool {
    !content.is_empty() && content.chars().count() <= MAX_CONTENT_CHARS
}
