//! Cron authorization gate.
//!
//! Cron endpoints accept a request only when it carries
//! `Authorization: Bearer <secret>` matching the configured shared secret.
use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;
use tracing::warn;

use super::error::ApiError;

/// Pure check of an `Authorization` header value against `secret`. An empty
/// secret authorizes nothing.
pub fn is_authorized(header_value: Option<&str>, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some(token) = header_value.and_then(|v| v.strip_prefix("Bearer ")) else {
        return false;
    };
    token.as_bytes().ct_eq(secret.as_bytes()).into()
}

/// Gate a request on its headers.
pub fn authorize(headers: &HeaderMap, secret: &str) -> Result<(), ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if is_authorized(value, secret) {
        Ok(())
    } else {
        warn!(header_present = value.is_some(), "rejected cron request");
        Err(ApiError::Unauthorized)
    }
}
