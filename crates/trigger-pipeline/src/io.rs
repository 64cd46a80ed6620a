//! Input and output boundaries.
//!
//! An [`InputHandle`] is one input channel: it owns a splicer strand and
//! accepts hits, requests, or pooled buffers of encoded records. A
//! [`RequestWriter`] encodes released requests into pooled buffers for
//! downstream consumers. Both draw on the pipeline's [`BufferPool`]; a run
//! is balanced once every buffer a reader or writer took has been dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use trigger_core::alloc::{BufferPool, PooledBuffer};
use trigger_core::payload::{codec, Hit, Payload, TriggerRequest};
use trigger_core::splicer::StrandTail;

use crate::PipelineError;

/// One input channel of a running pipeline.
///
/// Items must arrive in non-decreasing time order. Dropping the handle
/// without [`close`](Self::close) ends the channel too.
#[derive(Debug)]
pub struct InputHandle {
    tail: Option<StrandTail<Payload>>,
    open: Arc<AtomicUsize>,
}

impl InputHandle {
    pub(crate) fn new(tail: StrandTail<Payload>, open: Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::AcqRel);
        Self {
            tail: Some(tail),
            open,
        }
    }

    /// Strand index; simultaneous items from two inputs go lower index first.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.tail.as_ref().map(StrandTail::index)
    }

    /// Appends one payload, blocking while the strand queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Splicer`] for an out-of-order item (which is
    /// dropped) or when the pipeline is gone.
    pub fn push(&mut self, payload: Payload) -> Result<(), PipelineError> {
        let tail = self.tail.as_mut().ok_or(PipelineError::Shutdown)?;
        tail.push(payload)?;
        Ok(())
    }

    /// Appends one hit.
    ///
    /// # Errors
    ///
    /// See [`push`](Self::push).
    pub fn push_hit(&mut self, hit: Hit) -> Result<(), PipelineError> {
        self.push(Payload::Hit(hit))
    }

    /// Decodes every record in `buffer`, pushes them in order and returns
    /// the buffer to its pool. Returns the number of payloads pushed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Payload`] for a malformed buffer (nothing
    /// is pushed), or an error from [`push`](Self::push).
    pub fn feed(&mut self, buffer: PooledBuffer) -> Result<usize, PipelineError> {
        let payloads = codec::decode_all(&buffer[..])?;
        drop(buffer);
        let n = payloads.len();
        for payload in payloads {
            self.push(payload)?;
        }
        Ok(n)
    }

    /// Ends the channel.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Splicer`] if the pipeline is gone.
    pub fn close(mut self) -> Result<(), PipelineError> {
        match self.tail.take() {
            Some(tail) => {
                let index = tail.index();
                self.open.fetch_sub(1, Ordering::AcqRel);
                tail.close()?;
                debug!(strand = index, "input closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for InputHandle {
    fn drop(&mut self) {
        if self.tail.take().is_some() {
            self.open.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Encodes released requests into pooled buffers.
#[derive(Debug, Clone)]
pub struct RequestWriter {
    pool: BufferPool,
}

impl RequestWriter {
    /// Creates a writer drawing buffers from `pool`.
    #[must_use]
    pub fn new(pool: BufferPool) -> Self {
        Self { pool }
    }

    /// Encodes `requests` into one buffer. The buffer returns to the pool
    /// when the consumer drops it.
    #[must_use]
    pub fn write(&self, requests: &[TriggerRequest]) -> PooledBuffer {
        let mut buffer = self.pool.acquire();
        for request in requests {
            codec::encode_request(request, &mut *buffer);
        }
        buffer
    }

    /// Writes each request into its own buffer.
    pub fn write_each<'a>(
        &'a self,
        requests: impl IntoIterator<Item = &'a TriggerRequest> + 'a,
    ) -> impl Iterator<Item = PooledBuffer> + 'a {
        requests
            .into_iter()
            .map(move |request| self.write(std::slice::from_ref(request)))
    }
}
