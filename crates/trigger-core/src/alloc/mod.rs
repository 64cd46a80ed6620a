//! Buffer management for the byte boundary.

mod buffer_pool;

pub use buffer_pool::{BufferPool, BufferPoolStats, PooledBuffer};
