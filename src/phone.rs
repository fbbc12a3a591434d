//! Phone-number normalization for participant records.
//!
//! Numbers are stored in `+<country><subscriber>` form. Input may carry
//! spaces, dashes, dots or parentheses, an international `+`/`00` prefix, or a
//! national trunk `0` that is replaced by the configured country code.
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-.()/]").unwrap());
static ALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?\d+$").unwrap());
static NORMALIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{7,14}$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number is empty")]
    Empty,
    #[error("invalid phone number: {0}")]
    Invalid(String),
}

/// Normalize `raw` to `+<digits>`, using `default_country_code` (digits only)
/// for national numbers.
pub fn normalize(raw: &str, default_country_code: &str) -> Result<String, PhoneError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PhoneError::Empty);
    }
    let compact = SEPARATORS.replace_all(trimmed, "");
    if !ALLOWED.is_match(&compact) {
        return Err(PhoneError::Invalid(raw.to_string()));
    }

    let candidate = if let Some(rest) = compact.strip_prefix('+') {
        format!("+{rest}")
    } else if let Some(rest) = compact.strip_prefix("00") {
        format!("+{rest}")
    } else if let Some(rest) = compact.strip_prefix('0') {
        format!("+{default_country_code}{rest}")
    } else {
        format!("+{default_country_code}{compact}")
    };

    if NORMALIZED.is_match(&candidate) {
        Ok(candidate)
    } else {
        Err(PhoneError::Invalid(raw.to_string()))
    }
}

/// Like [`normalize`] but maps blank input to `None`.
pub fn normalize_optional(
    raw: Option<&str>,
    default_country_code: &str,
) -> Result<Option<String>, PhoneError> {
    match raw {
        Some(value) if !value.trim().is_empty() => {
            normalize(value, default_country_code).map(Some)
        }
        _ => Ok(None),
    }
}
