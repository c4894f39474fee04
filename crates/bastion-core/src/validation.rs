//! Request field validation shared by the admin, KB, and brief endpoints.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::{MAX_NAME_LEN, MAX_PROMPT_LEN, MAX_TEXT_LEN};
use crate::error::{Error, Result};

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,62}[a-z0-9])?$").expect("valid slug regex"));

/// Validate a display name: non-empty after trimming and at most
/// [`MAX_NAME_LEN`] characters.
pub fn validate_name(field: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "{} must be at most {} characters",
            field, MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// Validate an optional free-text field (descriptions, brief input).
pub fn validate_text(field: &str, value: Option<&str>) -> Result<()> {
    if let Some(v) = value {
        if v.chars().count() > MAX_TEXT_LEN {
            return Err(Error::InvalidInput(format!(
                "{} must be at most {} characters",
                field, MAX_TEXT_LEN
            )));
        }
    }
    Ok(())
}

/// Validate prompt or message content: non-empty and bounded.
pub fn validate_content(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    if value.chars().count() > MAX_PROMPT_LEN {
        return Err(Error::InvalidInput(format!(
            "{} must be at most {} characters",
            field, MAX_PROMPT_LEN
        )));
    }
    Ok(())
}

/// Validate an organisation slug: 2-64 lowercase ASCII alphanumerics and
/// hyphens, not starting or ending with a hyphen.
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.len() < 2 || !SLUG_RE.is_match(slug) {
        return Err(Error::InvalidInput(format!(
            "Invalid slug '{}': use 2-64 lowercase letters, digits, and hyphens",
            slug
        )));
    }
    Ok(())
}

/// Validate an email address loosely: one `@`, non-empty local part, dotted domain.
pub fn validate_email(email: &str) -> Result<()> {
    let invalid = || Error::InvalidInput(format!("Invalid email address '{}'", email));
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}
