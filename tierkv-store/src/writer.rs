//! # Async Writer
//!
//! Purpose: decouple client-visible latency from backing-store latency by
//! handing write-behind work to a single background worker over a bounded
//! queue.
//!
//! One worker thread, a mutex-guarded bounded queue, and a condition
//! variable signaling new work. The queue applies backpressure: once full,
//! `enqueue` blocks rather than growing without limit, up to a
//! caller-supplied `Option<Duration>` deadline after which it fails with
//! `Timeout` instead of enqueueing. `stop()` drains whatever is already
//! queued before the worker exits, so per-key ordering survives a shutdown
//! that races with in-flight writes.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tierkv_common::CoreError;
use tracing::{debug, warn};

use crate::pool::ConnectionPool;

/// A unit of write-behind work.
#[derive(Debug, Clone)]
pub enum WriteTask {
    Upsert { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

struct WriterState {
    queue: VecDeque<WriteTask>,
    shut_down: bool,
}

struct WriterInner {
    state: Mutex<WriterState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

/// Single-worker write-behind queue in front of a `ConnectionPool`.
///
/// Delivery is at-most-once: a task that fails against the store is logged
/// and discarded, never retried. Per-key ordering is preserved because
/// there is exactly one worker draining the queue FIFO.
pub struct AsyncWriter {
    inner: Arc<WriterInner>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncWriter {
    /// Spawns the background worker, which executes tasks against sessions
    /// acquired from `pool`.
    pub fn spawn(pool: ConnectionPool, capacity: usize) -> Self {
        let inner = Arc::new(WriterInner {
            state: Mutex::new(WriterState {
                queue: VecDeque::new(),
                shut_down: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        });

        let worker_inner = Arc::clone(&inner);
        let worker = thread::spawn(move || run_worker(worker_inner, pool));

        AsyncWriter {
            inner,
            worker: Some(worker),
        }
    }

    /// Enqueues a task, blocking while the queue is at `capacity`. `timeout`
    /// bounds how long the call will wait for room; `None` blocks with no
    /// deadline. Returns `Timeout` if the deadline elapses before a slot
    /// frees up, without enqueueing the task. Returns `Shutdown` if `stop`
    /// has already been called, whether that happens before the call starts
    /// waiting or while it is already waiting.
    pub fn enqueue(&self, task: WriteTask, timeout: Option<Duration>) -> Result<(), CoreError> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut state = self.inner.state.lock().expect("writer mutex poisoned");
        loop {
            if state.shut_down {
                return Err(CoreError::Shutdown);
            }
            if state.queue.len() < self.inner.capacity {
                state.queue.push_back(task);
                drop(state);
                self.inner.not_empty.notify_one();
                return Ok(());
            }

            state = match deadline {
                None => self
                    .inner
                    .not_full
                    .wait(state)
                    .expect("writer mutex poisoned"),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(CoreError::Timeout);
                    }
                    let (guard, _) = self
                        .inner
                        .not_full
                        .wait_timeout(state, deadline - now)
                        .expect("writer mutex poisoned");
                    guard
                }
            };
        }
    }

    /// Signals the worker to drain the remaining queue and exit, then
    /// blocks until it has. Calls to `enqueue` made after `stop` returns
    /// fail with `Shutdown`; calls already blocked inside `enqueue` when
    /// `stop` is invoked are released with `Shutdown` as soon as they wake.
    pub fn stop(&mut self) {
        {
            let mut state = self.inner.state.lock().expect("writer mutex poisoned");
            state.shut_down = true;
        }
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();

        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    /// Number of tasks currently queued, for tests and diagnostics.
    pub fn queue_len(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("writer mutex poisoned")
            .queue
            .len()
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

fn run_worker(inner: Arc<WriterInner>, pool: ConnectionPool) {
    loop {
        let task = {
            let mut state = inner.state.lock().expect("writer mutex poisoned");
            loop {
                if let Some(task) = state.queue.pop_front() {
                    drop_one_slot_notify(&inner);
                    break Some(task);
                }
                if state.shut_down {
                    break None;
                }
                state = inner.not_empty.wait(state).expect("writer mutex poisoned");
            }
        };

        let task = match task {
            Some(task) => task,
            None => {
                debug!("async writer drained, exiting");
                return;
            }
        };

        apply_task(&pool, task);
    }
}

fn drop_one_slot_notify(inner: &WriterInner) {
    inner.not_full.notify_one();
}

fn apply_task(pool: &ConnectionPool, task: WriteTask) {
    let mut session = match pool.acquire(Some(Duration::from_secs(5))) {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "async writer could not acquire a store session, discarding task");
            return;
        }
    };

    let result = session.with_store(|store| match &task {
        WriteTask::Upsert { key, value } => store.upsert(key, value),
        WriteTask::Delete { key } => store.delete(key),
    });

    if let Err(err) = result {
        warn!(error = %err, "async writer task failed, discarding (at-most-once delivery)");
    }
}
