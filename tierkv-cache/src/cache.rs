//! # Sharded LRU Cache
//!
//! Maps a key to its most recently observed value, evicting the
//! least-recently-used entry per shard once a fixed per-shard capacity is
//! reached.
//!
//! ## Design Principles
//!
//! 1. **Sharded Locks**: per-shard `RwLock`s so unrelated keys never
//!    contend, and no operation ever holds more than one shard's lock.
//! 2. **Strict Entry-Count LRU**: eviction triggers on entry count, not
//!    byte budget — a shard's size never exceeds its configured capacity,
//!    not even transiently.
//! 3. **Arc-backed Buffers**: keys and values are `Arc<[u8]>` so a hit can
//!    hand back a clone without copying the underlying bytes.
//! 4. **Index-Based Intrusive List**: LRU links are `Vec` indices rather
//!    than pointers, keeping the node arena safe and cache-friendly.
//!
//! ## Structure Overview
//!
//! ```text
//! ShardedCache
//!   └── shards: Vec<Shard>
//!         └── Shard { capacity, inner: RwLock<ShardInner> }
//!               └── ShardInner
//!                     ├── map: HashMap<Arc<[u8]>, usize>
//!                     ├── nodes: Vec<Option<Node>>
//!                     ├── free: Vec<usize>
//!                     └── head (LRU) / tail (MRU)
//! ```

use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;

/// A single entry in a shard's intrusive LRU list.
#[derive(Debug)]
struct Node {
    key: Arc<[u8]>,
    value: Arc<[u8]>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Per-shard storage: a hash map for O(1) lookup plus a dense node arena
/// for O(1) LRU reordering.
#[derive(Debug)]
struct ShardInner {
    map: HashMap<Arc<[u8]>, usize, RandomState>,
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    /// Least-recently-used end.
    head: Option<usize>,
    /// Most-recently-used end.
    tail: Option<usize>,
}

impl ShardInner {
    fn new(hash_state: RandomState) -> Self {
        ShardInner {
            map: HashMap::with_hasher(hash_state),
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    fn lru_remove(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().expect("node exists");
            (node.prev, node.next)
        };

        if let Some(prev_idx) = prev {
            if let Some(prev_node) = self.nodes[prev_idx].as_mut() {
                prev_node.next = next;
            }
        } else {
            self.head = next;
        }

        if let Some(next_idx) = next {
            if let Some(next_node) = self.nodes[next_idx].as_mut() {
                next_node.prev = prev;
            }
        } else {
            self.tail = prev;
        }

        if let Some(node) = self.nodes[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn lru_push_back(&mut self, idx: usize) {
        let tail = self.tail;
        if let Some(node) = self.nodes[idx].as_mut() {
            node.prev = tail;
            node.next = None;
        }

        if let Some(tail_idx) = tail {
            if let Some(tail_node) = self.nodes[tail_idx].as_mut() {
                tail_node.next = Some(idx);
            }
        } else {
            self.head = Some(idx);
        }

        self.tail = Some(idx);
    }

    /// Marks a node as most-recently-used by moving it to the tail.
    fn touch(&mut self, idx: usize) {
        if self.tail == Some(idx) {
            return;
        }
        self.lru_remove(idx);
        self.lru_push_back(idx);
    }

    fn insert_new(&mut self, key: Arc<[u8]>, value: Arc<[u8]>) -> usize {
        let idx = self.free.pop().unwrap_or_else(|| {
            self.nodes.push(None);
            self.nodes.len() - 1
        });

        self.nodes[idx] = Some(Node {
            key: Arc::clone(&key),
            value,
            prev: None,
            next: None,
        });
        self.lru_push_back(idx);
        self.map.insert(key, idx);
        idx
    }

    fn remove_idx(&mut self, idx: usize) {
        let Some(node) = self.nodes[idx].as_ref() else {
            return;
        };
        let key = Arc::clone(&node.key);
        self.lru_remove(idx);
        self.nodes[idx] = None;
        self.map.remove(key.as_ref());
        self.free.push(idx);
    }

    /// Evicts the least-recently-used entry, if any. Returns its key.
    fn pop_lru(&mut self) -> Option<Arc<[u8]>> {
        let idx = self.head?;
        let key = self.nodes[idx].as_ref().map(|n| Arc::clone(&n.key));
        self.remove_idx(idx);
        key
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

struct Shard {
    capacity: usize,
    inner: RwLock<ShardInner>,
}

/// A sharded, bounded LRU cache. Total capacity is `shard_count *
/// per_shard_capacity`; both are fixed for the cache's lifetime.
pub struct ShardedCache {
    shards: Vec<Shard>,
    shard_mask: usize,
    hash_state: RandomState,
}

impl ShardedCache {
    /// Creates a cache with the given shard count and per-shard entry
    /// capacity. `shard_count` is rounded up to the next power of two so
    /// shard selection can use a bitmask instead of a modulo.
    pub fn new(shard_count: usize, per_shard_capacity: usize) -> Self {
        assert!(per_shard_capacity > 0, "per_shard_capacity must be positive");
        let shard_count = shard_count.max(1).next_power_of_two();
        let hash_state = RandomState::new();

        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(Shard {
                capacity: per_shard_capacity,
                inner: RwLock::new(ShardInner::new(hash_state.clone())),
            });
        }

        ShardedCache {
            shards,
            shard_mask: shard_count - 1,
            hash_state,
        }
    }

    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = self.hash_state.build_hasher();
        hasher.write(key);
        (hasher.finish() as usize) & self.shard_mask
    }

    fn shard_for(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Looks up a key, promoting it to most-recently-used on a hit.
    pub fn get(&self, key: &[u8]) -> Option<Arc<[u8]>> {
        let shard = self.shard_for(key);
        let mut inner = shard.inner.write();

        let idx = *inner.map.get(key)?;
        let value = inner.nodes[idx].as_ref().map(|node| Arc::clone(&node.value));
        inner.touch(idx);
        value
    }

    /// Inserts or replaces a key's value, promoting it to most-recently-used.
    /// If the key is new and the shard is at capacity, the least-recently-used
    /// entry is evicted before the new one is recorded, so the shard's size
    /// never transiently exceeds its capacity.
    pub fn put(&self, key: &[u8], value: &[u8]) {
        let shard = self.shard_for(key);
        let mut inner = shard.inner.write();

        if let Some(&idx) = inner.map.get(key) {
            if let Some(node) = inner.nodes[idx].as_mut() {
                node.value = Arc::from(value);
            }
            inner.touch(idx);
            return;
        }

        if inner.len() >= shard.capacity {
            inner.pop_lru();
        }

        inner.insert_new(Arc::from(key), Arc::from(value));
    }

    /// Removes an entry if present; a no-op otherwise.
    pub fn remove(&self, key: &[u8]) {
        let shard = self.shard_for(key);
        let mut inner = shard.inner.write();
        if let Some(&idx) = inner.map.get(key) {
            inner.remove_idx(idx);
        }
    }

    /// Approximate total entry count, summed by locking each shard in turn.
    /// Not a global snapshot: a concurrent writer can change one shard's
    /// count between two of the locks taken here.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.inner.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walks shards in order, each under its own lock, invoking `visitor`
    /// with `(shard index, key)`. Diagnostics only: this is not a
    /// consistent global snapshot, since each shard is released before the
    /// next is locked.
    pub fn iter_debug(&self, mut visitor: impl FnMut(usize, &[u8])) {
        for (shard_idx, shard) in self.shards.iter().enumerate() {
            let inner = shard.inner.read();
            for key in inner.map.keys() {
                visitor(shard_idx, key);
            }
        }
    }

    /// Number of shards backing this cache.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}
