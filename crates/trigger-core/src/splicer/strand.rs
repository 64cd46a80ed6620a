//! Strand tails: the producer side of one splicer input.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::error;

use super::{SplicerCounters, SplicerError};
use crate::streaming::{Consumer, Producer, StreamingError};
use crate::time::{DaqTime, Flushable};

/// Producer end of one time-ordered input strand.
///
/// Items must be pushed in non-decreasing time order. The strand ends with
/// [`close`](Self::close), which pushes the flush sentinel. A tail dropped
/// without closing is treated as closed once its queue drains.
pub struct StrandTail<T> {
    index: usize,
    producer: Producer<T>,
    previous: Option<DaqTime>,
    closed: bool,
    counters: Arc<SplicerCounters>,
}

impl<T: Flushable> StrandTail<T> {
    pub(super) fn new(index: usize, producer: Producer<T>, counters: Arc<SplicerCounters>) -> Self {
        Self {
            index,
            producer,
            previous: None,
            closed: false,
            counters,
        }
    }

    /// Index of this strand; ties between strands break by index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Time of the last item pushed.
    #[must_use]
    pub fn last_time(&self) -> Option<DaqTime> {
        self.previous
    }

    /// Returns true once the sentinel has been pushed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Appends an item, blocking while the strand queue is full.
    ///
    /// Pushing the flush sentinel closes the strand.
    ///
    /// # Errors
    ///
    /// Returns [`SplicerError::OutOfOrder`] if the item is earlier than the
    /// previous one (the item is dropped and counted),
    /// [`SplicerError::StrandClosed`] after close, or
    /// [`SplicerError::Disconnected`] if the splicer is gone.
    pub fn push(&mut self, item: T) -> Result<(), SplicerError> {
        if self.closed {
            return Err(SplicerError::StrandClosed { strand: self.index });
        }
        let time = item.time();
        if let Some(previous) = self.previous {
            if time < previous {
                self.counters.items_rejected.fetch_add(1, Ordering::Relaxed);
                error!(strand = self.index, %time, %previous, "out-of-order item rejected");
                return Err(SplicerError::OutOfOrder {
                    strand: self.index,
                    time,
                    previous,
                });
            }
        }
        let is_flush = item.is_flush();
        self.producer.push(item).map_err(|e| match e {
            StreamingError::ChannelClosed => SplicerError::Disconnected { strand: self.index },
            StreamingError::ChannelFull { .. } => SplicerError::StrandClosed { strand: self.index },
        })?;
        self.previous = Some(time);
        self.closed = is_flush;
        Ok(())
    }

    /// Closes the strand by pushing the flush sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`SplicerError::Disconnected`] if the splicer is gone.
    pub fn close(mut self) -> Result<(), SplicerError> {
        if self.closed {
            return Ok(());
        }
        self.push(T::flush_sentinel())
    }
}

impl<T> std::fmt::Debug for StrandTail<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrandTail")
            .field("index", &self.index)
            .field("previous", &self.previous)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Consumer end of a strand, owned by the splicer.
pub(super) struct StrandCursor<T> {
    pub(super) index: usize,
    pub(super) consumer: Consumer<T>,
    pub(super) head: Option<T>,
    pub(super) closed: bool,
}

impl<T> StrandCursor<T> {
    pub(super) fn new(index: usize, consumer: Consumer<T>) -> Self {
        Self {
            index,
            consumer,
            head: None,
            closed: false,
        }
    }
}
