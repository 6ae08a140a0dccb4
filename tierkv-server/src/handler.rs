//! # Request Handler
//!
//! Purpose: orchestrate the cache, connection pool, and write-behind queue
//! behind CREATE/READ/DELETE. Reads check the cache first and only fall
//! through to the store on a miss; writes update the cache immediately and
//! enqueue the store write to happen asynchronously.

use std::sync::Arc;
use std::time::Duration;

use tierkv_cache::ShardedCache;
use tierkv_common::{validate_key, validate_value, CoreError};
use tierkv_store::{AsyncWriter, ConnectionPool, Store, WriteTask};
use tracing::{error, warn};

use crate::config::Config;
use crate::metrics::Metrics;

/// Orchestrates a single logical keyspace: a sharded cache in front of a
/// pooled backing store, with writes pushed through an async queue.
///
/// `create` and `delete` update the cache synchronously and enqueue the
/// corresponding store mutation; `read` checks the cache first and only
/// falls through to the store (populating the cache on the way back) on a
/// miss. The same `acquire_timeout` bounds both `read`'s pool acquisition
/// and `create`/`delete`'s enqueue wait, so neither can block a caller
/// indefinitely.
pub struct RequestHandler {
    cache: ShardedCache,
    pool: ConnectionPool,
    writer: AsyncWriter,
    max_key_len: usize,
    max_value_len: usize,
    acquire_timeout: Duration,
    pub metrics: Arc<Metrics>,
}

impl RequestHandler {
    pub fn new(config: &Config, pool: ConnectionPool, metrics: Arc<Metrics>) -> Self {
        let cache = ShardedCache::new(config.shard_count, config.shard_capacity);
        let writer = AsyncWriter::spawn(pool.clone(), config.write_queue_capacity);

        RequestHandler {
            cache,
            pool,
            writer,
            max_key_len: config.max_key_len,
            max_value_len: config.max_value_len,
            acquire_timeout: Duration::from_millis(config.pool_acquire_timeout_ms),
            metrics,
        }
    }

    /// Writes `(key, value)` into the cache and enqueues the store upsert.
    /// Returns once the cache is updated; the store write happens
    /// asynchronously so client-visible latency excludes store latency.
    /// Enqueueing is bounded by the configured acquire timeout, the same
    /// deadline applied to `read`'s pool acquisition; a queue that stays
    /// full past that deadline fails the call with `Timeout` rather than
    /// blocking forever.
    pub fn create(&self, key: &[u8], value: &[u8]) -> Result<(), CoreError> {
        validate_key(key, self.max_key_len)?;
        validate_value(value, self.max_value_len)?;

        self.cache.put(key, value);
        self.writer.enqueue(
            WriteTask::Upsert {
                key: key.to_vec(),
                value: value.to_vec(),
            },
            Some(self.acquire_timeout),
        )
    }

    /// Reads a value, checking the cache first. On a miss, acquires a
    /// pooled session, reads the store, and populates the cache with
    /// whatever was found. A confirmed absence is not cached — only
    /// positive results are.
    pub fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
        validate_key(key, self.max_key_len)?;

        if let Some(value) = self.cache.get(key) {
            return Ok(Some(value.to_vec()));
        }

        let mut session = self.pool.acquire(Some(self.acquire_timeout))?;
        let found = session.with_store(|store| store.read(key))?;
        if let Some(value) = &found {
            self.cache.put(key, value);
        }
        Ok(found)
    }

    /// Removes a key from the cache and enqueues the store delete, bounded
    /// by the same acquire timeout as `create`.
    pub fn delete(&self, key: &[u8]) -> Result<(), CoreError> {
        validate_key(key, self.max_key_len)?;

        self.cache.remove(key);
        self.writer.enqueue(
            WriteTask::Delete { key: key.to_vec() },
            Some(self.acquire_timeout),
        )
    }

    /// Stops the write-behind worker, draining whatever is already queued.
    /// Called once during orderly server shutdown.
    pub fn shutdown(&mut self) {
        self.writer.stop();
        self.pool.shutdown();
    }
}

/// Logs and bumps the error counter for server-side failures. Client
/// errors (bad request, not found) are not server faults and pass through
/// silently; the caller still turns every `Err` into a RESP error reply.
pub fn log_if_server_error(metrics: &Metrics, err: &CoreError) {
    match err {
        CoreError::StoreError(_) | CoreError::ConnectError(_) | CoreError::Timeout => {
            metrics.record_error();
            error!(error = %err, "request failed");
        }
        CoreError::Shutdown => {
            metrics.record_error();
            warn!("request rejected, server shutting down");
        }
        CoreError::BadRequest(_) | CoreError::NotFound => {
            // Client errors are not server faults; no metrics bump.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Condvar, Mutex};
    use tierkv_store::MockStore;

    fn test_handler() -> RequestHandler {
        let pool =
            ConnectionPool::new(2, || Ok(Box::new(MockStore::new()) as Box<dyn Store>)).unwrap();
        let config = Config {
            shard_count: 4,
            shard_capacity: 64,
            pool_size: 2,
            write_queue_capacity: 16,
            pool_acquire_timeout_ms: 200,
            ..Config::default()
        };
        RequestHandler::new(&config, pool, Arc::new(Metrics::new()))
    }

    #[test]
    fn create_then_read_hits_cache() {
        let handler = test_handler();
        handler.create(b"a", b"1").unwrap();
        assert_eq!(handler.read(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn read_of_absent_key_returns_none() {
        let handler = test_handler();
        assert_eq!(handler.read(b"missing").unwrap(), None);
    }

    #[test]
    fn delete_removes_from_cache_and_eventually_from_store() {
        let mut handler = test_handler();
        handler.create(b"a", b"1").unwrap();
        handler.delete(b"a").unwrap();
        handler.shutdown();
        assert_eq!(handler.read(b"a").unwrap(), None);
    }

    #[test]
    fn oversized_key_is_a_bad_request() {
        let handler = test_handler();
        let key = vec![0u8; handler.max_key_len + 1];
        let result = handler.create(&key, b"v");
        assert!(matches!(result, Err(CoreError::BadRequest(_))));
    }

    /// A value written by one handler is visible through a store-level
    /// read-through on a second handler sharing the same pool (its cache
    /// starts cold, so the second read must reach the store the writer
    /// already flushed to).
    #[test]
    fn read_through_populates_cache_after_store_round_trip() {
        let pool =
            ConnectionPool::new(1, || Ok(Box::new(MockStore::new()) as Box<dyn Store>)).unwrap();
        let config = Config {
            pool_size: 1,
            write_queue_capacity: 16,
            ..Config::default()
        };

        let writer_handler = RequestHandler::new(&config, pool.clone(), Arc::new(Metrics::new()));
        writer_handler.create(b"k", b"v").unwrap();
        // Dropping the handler stops (and drains) its writer without
        // shutting down the pool shared with `reader_handler`.
        drop(writer_handler);

        let reader_handler = RequestHandler::new(&config, pool, Arc::new(Metrics::new()));
        assert_eq!(reader_handler.read(b"k").unwrap(), Some(b"v".to_vec()));
    }

    /// `create` returns as soon as the cache is updated, a concurrent read
    /// sees the value through the cache immediately, and once the writer
    /// drains, a direct store lookup (via a second handler sharing the pool)
    /// also sees it.
    #[test]
    fn create_is_visible_through_cache_then_through_store_after_drain() {
        let pool =
            ConnectionPool::new(1, || Ok(Box::new(MockStore::new()) as Box<dyn Store>)).unwrap();
        let config = Config {
            pool_size: 1,
            write_queue_capacity: 16,
            ..Config::default()
        };

        let mut handler = RequestHandler::new(&config, pool.clone(), Arc::new(Metrics::new()));
        handler.create(b"u", b"v").unwrap();
        assert_eq!(handler.read(b"u").unwrap(), Some(b"v".to_vec()));

        handler.shutdown();

        let mut session = pool.acquire(None).unwrap();
        let stored = session.with_store(|store| store.read(b"u").unwrap());
        assert_eq!(stored, Some(b"v".to_vec()));
    }

    /// A store whose `upsert` blocks until released, used to pin the
    /// write-behind worker so the queue stays full and `enqueue` is forced
    /// to wait out its deadline.
    struct BlockingStore {
        gate: std::sync::Arc<(Mutex<bool>, Condvar)>,
        inner: MockStore,
    }

    impl Store for BlockingStore {
        fn upsert(&mut self, key: &[u8], value: &[u8]) -> Result<(), CoreError> {
            let (lock, cvar) = &*self.gate;
            let mut released = lock.lock().unwrap();
            while !*released {
                released = cvar.wait(released).unwrap();
            }
            self.inner.upsert(key, value)
        }

        fn read(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
            self.inner.read(key)
        }

        fn delete(&mut self, key: &[u8]) -> Result<(), CoreError> {
            self.inner.delete(key)
        }
    }

    #[test]
    fn create_times_out_when_write_queue_stays_full() {
        let gate = std::sync::Arc::new((Mutex::new(false), Condvar::new()));
        let gate_for_store = std::sync::Arc::clone(&gate);
        let pool = ConnectionPool::new(1, move || {
            Ok(Box::new(BlockingStore {
                gate: std::sync::Arc::clone(&gate_for_store),
                inner: MockStore::new(),
            }) as Box<dyn Store>)
        })
        .unwrap();
        let config = Config {
            pool_size: 1,
            write_queue_capacity: 1,
            pool_acquire_timeout_ms: 20,
            ..Config::default()
        };
        let mut handler = RequestHandler::new(&config, pool, Arc::new(Metrics::new()));

        // Worker dequeues this immediately and blocks inside upsert,
        // emptying the queue itself but pinning the worker so nothing
        // else ever drains.
        handler.create(b"a", b"1").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        // Fills the one remaining queue slot to capacity.
        handler.create(b"b", b"2").unwrap();

        let result = handler.create(b"c", b"3");
        assert!(matches!(result, Err(CoreError::Timeout)));

        let (lock, cvar) = &*gate;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
        handler.shutdown();
    }
}
