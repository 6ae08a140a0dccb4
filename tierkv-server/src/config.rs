//! # Server Configuration
//!
//! Purpose: a single `toml`-deserializable struct holding everything the
//! binary needs to start: listen address, shard/capacity knobs for the
//! cache, pool size, write-behind queue depth, and store coordinates.
//!
//! Plain struct with a `Default` impl, loaded from TOML and then
//! overridden by `TIERKV_*` environment variables so deployment tooling can
//! override individual fields without rewriting the file.

use std::path::Path;

use serde::Deserialize;
use tierkv_common::{CoreError, DEFAULT_MAX_KEY_LEN, DEFAULT_MAX_VALUE_LEN};

/// Top-level server configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub shard_count: usize,
    pub shard_capacity: usize,
    pub max_key_len: usize,
    pub max_value_len: usize,
    pub pool_size: usize,
    /// Deadline applied both to `pool.acquire` and to the write-behind
    /// queue's `enqueue`, so neither can block a caller indefinitely.
    pub pool_acquire_timeout_ms: u64,
    pub write_queue_capacity: usize,
    pub store: StoreSection,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "127.0.0.1:6380".to_string(),
            shard_count: 16,
            shard_capacity: 4096,
            max_key_len: DEFAULT_MAX_KEY_LEN,
            max_value_len: DEFAULT_MAX_VALUE_LEN,
            pool_size: 8,
            pool_acquire_timeout_ms: 2_000,
            write_queue_capacity: 1_024,
            store: StoreSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        StoreSection {
            host: "127.0.0.1".to_string(),
            port: 5432,
            user: "tierkv".to_string(),
            password: String::new(),
            database: "tierkv".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file on disk, then applies any
    /// `TIERKV_*` environment overrides on top (env wins over file, file
    /// wins over built-in defaults).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|err| CoreError::BadRequest(format!("cannot read config: {err}")))?;
        let mut config: Config =
            toml::from_str(&text).map_err(|err| CoreError::BadRequest(format!("bad config: {err}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overrides individual fields from environment variables, for the
    /// handful of settings an operator typically wants to set per-instance
    /// without editing the config file (listen address, store coordinates).
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("TIERKV_LISTEN_ADDR") {
            self.listen_addr = value;
        }
        if let Ok(value) = std::env::var("TIERKV_STORE_HOST") {
            self.store.host = value;
        }
        if let Ok(value) = std::env::var("TIERKV_STORE_PORT") {
            if let Ok(port) = value.parse() {
                self.store.port = port;
            }
        }
        if let Ok(value) = std::env::var("TIERKV_STORE_USER") {
            self.store.user = value;
        }
        if let Ok(value) = std::env::var("TIERKV_STORE_PASSWORD") {
            self.store.password = value;
        }
        if let Ok(value) = std::env::var("TIERKV_STORE_DATABASE") {
            self.store.database = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_self_consistent() {
        let config = Config::default();
        assert!(config.shard_count > 0);
        assert!(config.pool_size > 0);
    }

    #[test]
    fn parses_partial_toml_over_defaults() {
        let toml_text = r#"
            listen_addr = "0.0.0.0:7000"

            [store]
            host = "db.internal"
        "#;
        let config: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:7000");
        assert_eq!(config.store.host, "db.internal");
        assert_eq!(config.store.port, 5432);
    }

    #[test]
    fn env_override_wins_over_file_value() {
        std::env::set_var("TIERKV_STORE_HOST", "override.internal");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("TIERKV_STORE_HOST");
        assert_eq!(config.store.host, "override.internal");
    }
}
