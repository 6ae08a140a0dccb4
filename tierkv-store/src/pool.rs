//! # Connection Pool
//!
//! Purpose: own a fixed number of live sessions to the backing store and
//! hand them out one at a time to callers under a blocking `acquire`.
//!
//! A mutex-guarded vector of sessions, LIFO `pop`/`push`, and a condition
//! variable woken on release. `acquire` takes a caller-supplied
//! `Option<Duration>` so a full pool can fail fast instead of blocking
//! forever.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tierkv_common::CoreError;

use crate::store::Store;

struct PoolState {
    /// Idle sessions, LIFO (back of the vector is popped first).
    available: Vec<Box<dyn Store>>,
    shut_down: bool,
}

struct PoolInner {
    state: Mutex<PoolState>,
    available_cv: Condvar,
    size: usize,
}

/// Fixed-size pool of live sessions against the backing store.
///
/// Invariant: at any instant, `|available| + |handed out| == size`. The
/// pool never opens more than `size` sessions over its lifetime.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Builds a pool of exactly `size` sessions using `factory` to open
    /// each one. If any connection attempt fails, sessions already opened
    /// are dropped (closing them) and `ConnectError` is returned; partial
    /// success is never exposed.
    pub fn new<F>(size: usize, mut factory: F) -> Result<Self, CoreError>
    where
        F: FnMut() -> Result<Box<dyn Store>, CoreError>,
    {
        let mut available = Vec::with_capacity(size);
        for _ in 0..size {
            match factory() {
                Ok(session) => available.push(session),
                Err(err) => {
                    // Drop whatever was opened so far; nothing partial leaks out.
                    drop(available);
                    return Err(err);
                }
            }
        }

        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    available,
                    shut_down: false,
                }),
                available_cv: Condvar::new(),
                size,
            }),
        })
    }

    /// Number of sessions this pool was constructed with.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Blocks until a session is available, `timeout` elapses, or the pool
    /// is shut down. `None` blocks with no deadline. LIFO hand-out; no
    /// fairness guarantee beyond eventual service is made.
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<PooledSession, CoreError> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");

        loop {
            if state.shut_down {
                return Err(CoreError::Shutdown);
            }
            if let Some(session) = state.available.pop() {
                return Ok(PooledSession {
                    session: Some(session),
                    pool: self.clone(),
                });
            }

            state = match deadline {
                None => self
                    .inner
                    .available_cv
                    .wait(state)
                    .expect("pool mutex poisoned"),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(CoreError::Timeout);
                    }
                    let (guard, _) = self
                        .inner
                        .available_cv
                        .wait_timeout(state, deadline - now)
                        .expect("pool mutex poisoned");
                    guard
                }
            };
        }
    }

    /// Returns a session to the pool and wakes at most one waiter.
    ///
    /// Releasing a session not obtained from this pool, or releasing it
    /// twice, is a programming error; this method has no way to detect
    /// either case, since a session carries no pool-affinity tag.
    fn release(&self, session: Box<dyn Store>) {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        state.available.push(session);
        drop(state);
        self.inner.available_cv.notify_one();
    }

    /// Closes all idle sessions and marks the pool shut down. Any
    /// subsequent `acquire` fails with `Shutdown`. Sessions already held
    /// by callers are not revoked; the caller must release them, at which
    /// point they are simply dropped (closed) instead of returned to the
    /// idle set.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        state.shut_down = true;
        state.available.clear();
        drop(state);
        self.inner.available_cv.notify_all();
    }
}

/// RAII handle for a session checked out of the pool. Returns the session
/// to the pool on drop, unless the pool has since been shut down.
pub struct PooledSession {
    session: Option<Box<dyn Store>>,
    pool: ConnectionPool,
}

impl PooledSession {
    /// Executes `f` against the underlying store session.
    pub fn with_store<T>(&mut self, f: impl FnOnce(&mut dyn Store) -> T) -> T {
        let session = self.session.as_mut().expect("session present until drop");
        f(session.as_mut())
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let shut_down = self
                .pool
                .inner
                .state
                .lock()
                .expect("pool mutex poisoned")
                .shut_down;
            if shut_down {
                // Session is simply closed by `drop(session)` here.
                return;
            }
            self.pool.release(session);
        }
    }
}
