// tierkv-store - Backing store abstraction, fixed-size connection pool, and
// the async write-behind queue that decouples client latency from store
// latency.

pub mod pool;
pub mod store;
pub mod writer;

pub use pool::{ConnectionPool, PooledSession};
pub use store::{MockStore, PostgresStore, Store, StoreConfig};
pub use writer::{AsyncWriter, WriteTask};
