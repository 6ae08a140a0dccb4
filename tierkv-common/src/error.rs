//! # Core Error Kinds
//!
//! The error surface shared by the cache, pool, writer, and handler crates.

/// Errors surfaced by the core components to the request handler.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Empty key or oversize payload.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Read against a key present in neither cache nor store.
    #[error("not found")]
    NotFound,

    /// The backing store rejected or failed a statement.
    #[error("store error: {0}")]
    StoreError(String),

    /// Acquire or enqueue exceeded its caller-supplied deadline.
    #[error("timed out")]
    Timeout,

    /// Operation attempted after the pool or writer was stopped.
    #[error("shut down")]
    Shutdown,

    /// Pool construction failed.
    #[error("connect error: {0}")]
    ConnectError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_carries_its_message() {
        let err = CoreError::BadRequest("empty key".into());
        assert_eq!(err.to_string(), "bad request: empty key");
    }

    #[test]
    fn not_found_has_a_fixed_message() {
        assert_eq!(CoreError::NotFound.to_string(), "not found");
    }

    #[test]
    fn store_error_carries_its_message() {
        let err = CoreError::StoreError("connection reset".into());
        assert_eq!(err.to_string(), "store error: connection reset");
    }
}
