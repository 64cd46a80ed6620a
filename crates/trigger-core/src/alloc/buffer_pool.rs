//! Shared pool of byte buffers.
//!
//! Readers acquire buffers to decode input, writers release them once the
//! encoded output has been handed off. The pool only counts: a run is
//! balanced when every acquire has been matched by a release.
//!
//! ```
//! use trigger_core::alloc::BufferPool;
//!
//! let pool = BufferPool::new(4, 256);
//! {
//!     let mut buf = pool.acquire();
//!     buf.extend_from_slice(b"hit");
//!     assert_eq!(pool.outstanding(), 1);
//! } // released on drop
//! assert!(pool.is_balanced());
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

#[derive(Debug)]
struct PoolInner {
    free_list: Mutex<Vec<BytesMut>>,
    max_retained: usize,
    buffer_capacity: usize,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// A counted pool of reusable [`BytesMut`] buffers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

/// Pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferPoolStats {
    /// Buffers handed out.
    pub acquired: u64,
    /// Buffers returned.
    pub released: u64,
    /// Buffers currently idle in the free list.
    pub retained: usize,
}

impl BufferPool {
    /// Creates a pool keeping at most `max_retained` idle buffers of
    /// `buffer_capacity` bytes each.
    #[must_use]
    pub fn new(max_retained: usize, buffer_capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free_list: Mutex::new(Vec::with_capacity(max_retained)),
                max_retained,
                buffer_capacity,
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Takes a cleared buffer from the pool, allocating if none is idle.
    #[must_use]
    pub fn acquire(&self) -> PooledBuffer {
        let buf = self
            .inner
            .free_list
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.inner.buffer_capacity));
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        PooledBuffer {
            buf,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Buffers acquired and not yet released.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        let stats = self.stats();
        stats.acquired.saturating_sub(stats.released)
    }

    /// Returns true if every acquire has been matched by a release.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.outstanding() == 0
    }

    /// Pool counters.
    #[must_use]
    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            acquired: self.inner.acquired.load(Ordering::Acquire),
            released: self.inner.released.load(Ordering::Acquire),
            retained: self.inner.free_list.lock().len(),
        }
    }
}

impl PoolInner {
    fn release(&self, mut buf: BytesMut) {
        self.released.fetch_add(1, Ordering::AcqRel);
        let mut free = self.free_list.lock();
        if free.len() < self.max_retained {
            buf.clear();
            free.push(buf);
        }
    }
}

/// A buffer on loan from a [`BufferPool`]; returned exactly once, on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: BytesMut,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Copies the contents out as immutable bytes. The buffer stays on loan.
    #[must_use]
    pub fn to_bytes(&self) -> bytes::Bytes {
        bytes::Bytes::copy_from_slice(self)
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf);
    }
}
