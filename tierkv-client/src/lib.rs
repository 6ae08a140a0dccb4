//! # tierkv Sync Client
//!
//! Lightweight, synchronous client with connection pooling to minimize
//! TCP handshake overhead, talking CREATE/READ/DELETE RESP2 to the server.

mod client;
mod pool;
mod resp;

pub use client::{ClientConfig, ClientError, ClientResult, KvClient};
