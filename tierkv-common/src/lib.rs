// tierkv-common - Shared error and bound types for the read-through /
// write-behind key-value cache.

pub mod error;
pub mod limits;

pub use error::CoreError;
pub use limits::{validate_key, validate_value, DEFAULT_MAX_KEY_LEN, DEFAULT_MAX_VALUE_LEN};
