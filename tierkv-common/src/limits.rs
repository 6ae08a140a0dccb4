//! # Key / Value Bounds
//!
//! Keys and values are opaque byte strings bounded by the handler.
//! Validation lives here so the cache, store, and server agree on one
//! definition without importing each other.

use crate::error::CoreError;

/// Suggested maximum key length in bytes.
pub const DEFAULT_MAX_KEY_LEN: usize = 512;

/// Suggested maximum value length in bytes.
pub const DEFAULT_MAX_VALUE_LEN: usize = 4096;

/// Validates a key against the empty-key rule and a caller-supplied bound.
///
/// Empty keys are always rejected; the length ceiling is configurable so
/// deployments can raise or lower it.
pub fn validate_key(key: &[u8], max_len: usize) -> Result<(), CoreError> {
    if key.is_empty() {
        return Err(CoreError::BadRequest("key must not be empty".into()));
    }
    if key.len() > max_len {
        return Err(CoreError::BadRequest(format!(
            "key exceeds maximum length of {max_len} bytes"
        )));
    }
    Ok(())
}

/// Validates a value against a caller-supplied bound. Empty values are
/// permitted.
pub fn validate_value(value: &[u8], max_len: usize) -> Result<(), CoreError> {
    if value.len() > max_len {
        return Err(CoreError::BadRequest(format!(
            "value exceeds maximum length of {max_len} bytes"
        )));
    }
    Ok(())
}
