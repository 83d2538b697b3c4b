//! Input validation for everything that becomes a file name, a URL segment or stored text.
//!
//! Usernames, slugs, post ids and upload names all end up as path components under
//! the data directory, so each has a validator here and storage never joins an
//! unchecked string onto a path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Longest category name accepted.
pub const MAX_CATEGORY_NAME: usize = 100;
/// Longest thread name accepted.
pub const MAX_THREAD_NAME: usize = 200;
/// Longest email address accepted.
pub const MAX_EMAIL: usize = 254;

/// Slugs that would collide with fixed routes.
pub const RESERVED_CATEGORY_SLUGS: &[&str] = &["add-category"];
pub const RESERVED_THREAD_SLUGS: &[&str] = &["add-thread"];

/// Username validation errors with helpful messages
#[derive(Debug, thiserror::Error)]
pub enum UsernameError {
    #[error("Username is too short (minimum 2 characters)")]
    TooShort,

    #[error("Username is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Username cannot start or end with whitespace")]
    InvalidWhitespace,

    #[error("Username contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },

    #[error("Username contains path separators (/ or \\)")]
    PathTraversal,

    #[error("Username is a reserved system name")]
    Reserved,
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Invalid name: {reason}")]
    InvalidName { reason: String },

    #[error("Invalid slug: {reason}")]
    InvalidSlug { reason: String },

    #[error("Invalid id: {reason}")]
    InvalidId { reason: String },

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Content is empty")]
    EmptyContent,

    #[error("Content too long (max {max_length} bytes)")]
    ContentTooLong { max_length: usize },

    #[error("File size exceeds limit ({limit} bytes)")]
    FileSizeExceeded { limit: usize },

    #[error("Invalid path or path traversal attempt")]
    InvalidPath,

    #[error("Invalid format")]
    InvalidFormat,
}

/// Username validation rules configuration
#[derive(Debug, Clone)]
pub struct UsernameRules {
    pub min_length: usize,
    pub max_length: usize,
    pub allow_reserved_admin: bool,
}

impl UsernameRules {
    /// Rules for the configured administrator account.
    pub fn admin() -> Self {
        UsernameRules {
            min_length: 2,
            max_length: 30,
            allow_reserved_admin: true,
        }
    }

    /// Rules for self-registered accounts.
    pub fn user() -> Self {
        UsernameRules {
            min_length: 2,
            max_length: 30,
            allow_reserved_admin: false,
        }
    }
}

/// Generate safe filename from a username using percent encoding
pub fn safe_filename(username: &str) -> String {
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
    utf8_percent_encode(username, NON_ALPHANUMERIC).to_string()
}

fn reserved_names() -> HashSet<&'static str> {
    [
        "admin", "administrator", "root", "system", "moderator", "staff",
        "anonymous", "guest", "null", "none",
        "con", "prn", "aux", "nul",
        // route segments under /forum/ and /accounts/
        "login", "logout", "register", "profile", "users", "messages", "search",
        "media", "static", "add-category", "add-thread",
    ]
    .iter()
    .copied()
    .collect()
}

/// Validate a username according to the given rules.
///
/// Names appear in URLs (`/forum/profile/<name>/`) so only ASCII letters, digits,
/// `_`, `-` and `.` are accepted.
pub fn validate_username(username: &str, rules: &UsernameRules) -> Result<String, UsernameError> {
    let trimmed = username.trim();

    if trimmed.chars().count() < rules.min_length {
        return Err(UsernameError::TooShort);
    }
    if trimmed.chars().count() > rules.max_length {
        return Err(UsernameError::TooLong { max: rules.max_length });
    }
    if trimmed != username {
        return Err(UsernameError::InvalidWhitespace);
    }

    let lower = trimmed.to_lowercase();
    if reserved_names().contains(lower.as_str()) && !(rules.allow_reserved_admin && lower == "admin") {
        return Err(UsernameError::Reserved);
    }

    if trimmed.contains("..") || trimmed.contains('/') || trimmed.contains('\\') {
        return Err(UsernameError::PathTraversal);
    }

    let invalid: HashSet<char> = trimmed
        .chars()
        .filter(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || *c == '.'))
        .collect();
    if !invalid.is_empty() {
        let mut chars: Vec<char> = invalid.into_iter().collect();
        chars.sort_unstable();
        let chars = chars
            .into_iter()
            .map(|c| if c.is_control() { format!("\\u{{{:04x}}}", c as u32) } else { c.to_string() })
            .collect::<String>();
        return Err(UsernameError::InvalidCharacters { chars });
    }

    Ok(trimmed.to_string())
}

/// Validate a regular user name
pub fn validate_user_name(name: &str) -> Result<String, UsernameError> {
    validate_username(name, &UsernameRules::user())
}

/// Validate the administrator name from config / CLI
pub fn validate_admin_name(name: &str) -> Result<String, UsernameError> {
    validate_username(name, &UsernameRules::admin())
}

/// Turn a display name into a URL slug.
///
/// Decomposes to NFKD first so accented letters fold to their ASCII base
/// ("Café" becomes "cafe"). Then keeps ASCII letters, digits, `_`, whitespace
/// and `-`; drops everything else; lowercases; collapses runs of
/// whitespace/hyphens into one `-`; trims leading and trailing `-` and `_`.
/// A name with no ASCII-foldable letters produces an empty slug (callers reject that).
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.nfkd() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' {
            pending_sep = true;
        }
    }
    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Validate a category/thread display name and return (trimmed name, slug).
pub fn validate_entity_name(name: &str, max_chars: usize, reserved: &[&str]) -> Result<(String, String), SecurityError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SecurityError::InvalidName { reason: "Name cannot be empty".to_string() });
    }
    if trimmed.chars().count() > max_chars {
        return Err(SecurityError::InvalidName { reason: format!("Name too long (max {} characters)", max_chars) });
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(SecurityError::InvalidName { reason: "Name contains control characters".to_string() });
    }
    let slug = slugify(trimmed);
    if slug.is_empty() {
        return Err(SecurityError::InvalidSlug { reason: "Name must contain at least one ASCII letter or digit".to_string() });
    }
    if reserved.contains(&slug.as_str()) {
        return Err(SecurityError::InvalidSlug { reason: format!("'{}' is reserved", slug) });
    }
    Ok((trimmed.to_string(), slug))
}

/// Validate a slug taken from a URL before it is used as a file name.
pub fn validate_slug(slug: &str) -> Result<String, SecurityError> {
    if slug.is_empty() || slug.len() > 220 {
        return Err(SecurityError::InvalidSlug { reason: "Slug length out of range".to_string() });
    }
    if !slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_') {
        return Err(SecurityError::InvalidSlug { reason: "Slug may only contain a-z, 0-9, '-' and '_'".to_string() });
    }
    Ok(slug.to_string())
}

/// Validate a post or pm id (must be a UUID)
pub fn validate_record_id(id: &str) -> Result<String, SecurityError> {
    let trimmed = id.trim();
    if uuid::Uuid::parse_str(trimmed).is_err() {
        return Err(SecurityError::InvalidId { reason: "Id must be a valid UUID".to_string() });
    }
    Ok(trimmed.to_string())
}

/// Loose email shape check: one `@`, non-empty local part, dotted domain, no spaces.
pub fn validate_email(email: &str) -> Result<String, SecurityError> {
    let trimmed = email.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_EMAIL || trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(SecurityError::InvalidEmail);
    }
    let mut parts = trimmed.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(l), Some(d), None) => (l, d),
        _ => return Err(SecurityError::InvalidEmail),
    };
    if local.is_empty() || domain.starts_with('.') || domain.ends_with('.') || !domain.contains('.') {
        return Err(SecurityError::InvalidEmail);
    }
    Ok(trimmed.to_string())
}

/// Sanitize post / message text: strip control characters except newline and tab,
/// then enforce non-blank and the byte limit.
pub fn sanitize_message_content(content: &str, max_bytes: usize) -> Result<String, SecurityError> {
    if content.len() > max_bytes {
        return Err(SecurityError::ContentTooLong { max_length: max_bytes });
    }
    let sanitized: String = content
        .chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\t')
        .collect();
    if sanitized.trim().is_empty() {
        return Err(SecurityError::EmptyContent);
    }
    Ok(sanitized)
}

/// Reduce an uploaded file name to a safe basename (ASCII word chars, `-` and `.`).
pub fn sanitize_upload_name(filename: &str) -> Result<String, SecurityError> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() || cleaned.len() > 100 {
        return Err(SecurityError::InvalidName { reason: "Unusable upload file name".to_string() });
    }
    let ext = cleaned.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    if !matches!(ext.as_str(), "png" | "jpg" | "jpeg" | "gif" | "webp") {
        return Err(SecurityError::InvalidName { reason: "Only png, jpg, gif and webp images are accepted".to_string() });
    }
    Ok(cleaned)
}

/// Validate file size before reading
pub fn validate_file_size(size: u64, max_size: u64) -> Result<(), SecurityError> {
    if size > max_size {
        return Err(SecurityError::FileSizeExceeded { limit: max_size as usize });
    }
    Ok(())
}

/// `<data_dir>/threads/<slug>.json`
pub fn secure_thread_path(data_dir: &str, slug: &str) -> Result<PathBuf, SecurityError> {
    let slug = validate_slug(slug)?;
    Ok(Path::new(data_dir).join("threads").join(format!("{}.json", slug)))
}

/// `<data_dir>/posts/<thread>`
pub fn secure_post_dir(data_dir: &str, thread_slug: &str) -> Result<PathBuf, SecurityError> {
    let slug = validate_slug(thread_slug)?;
    let path = Path::new(data_dir).join("posts").join(slug);
    if !path.starts_with(data_dir) {
        return Err(SecurityError::InvalidPath);
    }
    Ok(path)
}

/// `<data_dir>/posts/<thread>/<id>.json`
pub fn secure_post_path(data_dir: &str, thread_slug: &str, post_id: &str) -> Result<PathBuf, SecurityError> {
    let id = validate_record_id(post_id)?;
    Ok(secure_post_dir(data_dir, thread_slug)?.join(format!("{}.json", id)))
}

/// Securely parse JSON with size limits and error handling
pub fn secure_json_parse<T>(content: &str, max_bytes: usize) -> Result<T, SecurityError>
where
    T: serde::de::DeserializeOwned,
{
    if content.len() > max_bytes {
        return Err(SecurityError::FileSizeExceeded { limit: max_bytes });
    }
    // Interrupted writes have been seen to leave leading NULs; valid JSON never starts with one.
    let normalized = content.trim_start_matches('\0');
    serde_json::from_str(normalized).map_err(|_| SecurityError::InvalidFormat)
}
