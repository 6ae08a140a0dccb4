// tierkv-cache - Sharded, bounded LRU cache for the read-through /
// write-behind key-value service.

pub mod cache;

pub use cache::ShardedCache;
