//! # Backing Store
//!
//! Purpose: define the parameterized UPSERT/SELECT/DELETE contract the pool
//! and async writer execute against, and a PostgreSQL implementation of it.
//!
//! All statements are parameterized (`$1`/`$2` placeholders via
//! `postgres::Client::execute`/`query_opt`) — no string-built SQL, no manual
//! escaping.

use postgres::{Client, NoTls};
use tierkv_common::CoreError;

/// A session against the backing store. Owned exclusively by whoever
/// currently holds it (the pool hands out one at a time).
///
/// Implementations must bind keys and values as data, never concatenate
/// them into a query expression.
pub trait Store: Send {
    /// Writes `(key, value)`; replaces any prior value for `key`.
    fn upsert(&mut self, key: &[u8], value: &[u8]) -> Result<(), CoreError>;

    /// Returns the value for `key`, or `None` if absent.
    fn read(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, CoreError>;

    /// Removes any row for `key`. Absence is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<(), CoreError>;
}

/// Coordinates needed to open a session against the backing store. Opaque
/// to the cache and writer; only the store implementation interprets them.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl StoreConfig {
    fn conninfo(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.user, self.password, self.database
        )
    }
}

/// PostgreSQL-backed store. One `PostgresStore` wraps one live `Client`;
/// the pool owns `N` of these.
///
/// Schema creation is left to the caller: the store only ever issues
/// `INSERT ... ON CONFLICT`, `SELECT`, and `DELETE` against a
/// `kv(key, value)` table that is assumed to already exist with a unique
/// constraint on `key`.
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Opens a single live session against the backing store.
    ///
    /// Connects with `NoTls`; TLS termination is left to network-level
    /// infrastructure in front of the store.
    pub fn connect(config: &StoreConfig) -> Result<Self, CoreError> {
        let client = Client::connect(&config.conninfo(), NoTls)
            .map_err(|err| CoreError::ConnectError(err.to_string()))?;
        Ok(PostgresStore { client })
    }
}

impl Store for PostgresStore {
    fn upsert(&mut self, key: &[u8], value: &[u8]) -> Result<(), CoreError> {
        self.client
            .execute(
                "INSERT INTO kv (key, value) VALUES ($1, $2) \
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                &[&key, &value],
            )
            .map_err(|err| CoreError::StoreError(err.to_string()))?;
        Ok(())
    }

    fn read(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
        let row = self
            .client
            .query_opt("SELECT value FROM kv WHERE key = $1", &[&key])
            .map_err(|err| CoreError::StoreError(err.to_string()))?;
        Ok(row.map(|row| row.get::<_, Vec<u8>>(0)))
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), CoreError> {
        self.client
            .execute("DELETE FROM kv WHERE key = $1", &[&key])
            .map_err(|err| CoreError::StoreError(err.to_string()))?;
        Ok(())
    }
}

/// In-memory store used by tests in place of a live PostgreSQL instance,
/// matching the fake-peer approach the client test suite uses instead of a
/// real server.
#[derive(Debug, Default)]
pub struct MockStore {
    rows: std::collections::HashMap<Vec<u8>, Vec<u8>>,
}

impl MockStore {
    pub fn new() -> Self {
        MockStore::default()
    }

    /// Direct lookup bypassing the `Store` trait, for asserting the store's
    /// state in tests without going through a pool.
    pub fn peek(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.rows.get(key)
    }
}

impl Store for MockStore {
    fn upsert(&mut self, key: &[u8], value: &[u8]) -> Result<(), CoreError> {
        self.rows.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn read(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(self.rows.get(key).cloned())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), CoreError> {
        self.rows.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_store_roundtrips() {
        let mut store = MockStore::new();
        store.upsert(b"a", b"1").unwrap();
        assert_eq!(store.read(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn mock_store_delete_is_noop_on_missing_key() {
        let mut store = MockStore::new();
        assert!(store.delete(b"missing").is_ok());
    }

    #[test]
    fn mock_store_upsert_replaces_prior_value() {
        let mut store = MockStore::new();
        store.upsert(b"a", b"1").unwrap();
        store.upsert(b"a", b"2").unwrap();
        assert_eq!(store.read(b"a").unwrap(), Some(b"2".to_vec()));
    }
}
