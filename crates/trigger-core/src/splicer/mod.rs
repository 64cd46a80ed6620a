//! # Splicer
//!
//! N-way time-ordered merge of independently produced strands.
//!
//! Each input obtains a [`StrandTail`] and pushes items in non-decreasing
//! time order. The [`Splicer`] keeps one cursor per open strand and emits the
//! globally earliest head, but only once every open strand's head is known:
//! an open strand with nothing queued stalls the merge. Ties break by strand
//! index. A strand ends when its flush sentinel is reached; when the last
//! strand ends the splicer emits its own sentinel and is finished.
//!
//! Strands may be added while the merge is running, from any thread, through
//! a [`SplicerHandle`]. A splicer built with
//! [`until_sealed`](Splicer::until_sealed) stays open with no strands until
//! its owner calls [`seal`](SplicerHandle::seal), so a strand added after the
//! others have closed still joins the merge. Once sealed or finished the
//! splicer refuses new strands.
//!
//! ```rust
//! use trigger_core::payload::{ChannelId, Hit, Payload};
//! use trigger_core::splicer::Splicer;
//! use trigger_core::time::{DaqTime, Flushable, Timed};
//!
//! let mut splicer = Splicer::<Payload>::new();
//! let mut a = splicer.add_strand()?;
//! let mut b = splicer.add_strand()?;
//!
//! a.push(Hit::spe(DaqTime::new(30), ChannelId::new(1, 1)).into()).unwrap();
//! b.push(Hit::spe(DaqTime::new(10), ChannelId::new(2, 1)).into()).unwrap();
//! a.close().unwrap();
//! b.close().unwrap();
//!
//! let mut out = Vec::new();
//! splicer.drain_ready(&mut out).unwrap();
//! let times: Vec<_> = out.iter().map(Timed::time).collect();
//! assert_eq!(times, vec![DaqTime::new(10), DaqTime::new(30), DaqTime::MAX]);
//! assert!(out[2].is_flush());
//! # Ok::<(), trigger_core::splicer::SplicerError>(())
//! ```

mod error;
mod strand;

pub use error::SplicerError;
pub use strand::StrandTail;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::streaming::{channel_with_config, ChannelConfig, RecvError};
use crate::time::{DaqTime, Flushable};
use strand::StrandCursor;

#[derive(Debug, Default)]
struct SplicerCounters {
    items_emitted: AtomicU64,
    items_rejected: AtomicU64,
    strands_added: AtomicU64,
}

struct Registry<T> {
    pending: Mutex<Vec<StrandCursor<T>>>,
    next_index: AtomicUsize,
    channel: ChannelConfig,
    counters: Arc<SplicerCounters>,
    sealed: AtomicBool,
    // Written under the `pending` lock.
    finished: AtomicBool,
}

impl<T: Flushable> Registry<T> {
    fn add_strand(&self) -> Result<StrandTail<T>, SplicerError> {
        let mut pending = self.pending.lock();
        if self.finished.load(Ordering::Acquire) || self.sealed.load(Ordering::Acquire) {
            warn!("strand refused; splicer is sealed");
            return Err(SplicerError::Sealed);
        }
        let index = self.next_index.fetch_add(1, Ordering::AcqRel);
        let (producer, consumer) = channel_with_config(&self.channel);
        pending.push(StrandCursor::new(index, consumer));
        self.counters.strands_added.fetch_add(1, Ordering::Relaxed);
        debug!(strand = index, "strand added");
        Ok(StrandTail::new(index, producer, Arc::clone(&self.counters)))
    }

    fn seal(&self) {
        if !self.sealed.swap(true, Ordering::AcqRel) {
            debug!("splicer sealed");
        }
    }
}

/// Cloneable handle for adding strands from other threads.
pub struct SplicerHandle<T> {
    registry: Arc<Registry<T>>,
}

impl<T: Flushable> SplicerHandle<T> {
    /// Adds a strand to the splicer this handle belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`SplicerError::Sealed`] once the splicer is sealed or
    /// finished.
    pub fn add_strand(&self) -> Result<StrandTail<T>, SplicerError> {
        self.registry.add_strand()
    }

    /// Stops accepting strands. The splicer finishes once the strands it
    /// already has are closed.
    pub fn seal(&self) {
        self.registry.seal();
    }

    /// Returns true once no further strand can be added.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.registry.sealed.load(Ordering::Acquire)
            || self.registry.finished.load(Ordering::Acquire)
    }
}

impl<T> Clone for SplicerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Splicer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplicerStats {
    /// Strands not yet closed, including ones not yet picked up.
    pub strands_open: usize,
    /// Strands ever added.
    pub strands_added: u64,
    /// Items emitted, excluding the final sentinel.
    pub items_emitted: u64,
    /// Items rejected for ordering violations.
    pub items_rejected: u64,
}

/// The merge engine. Owned by the thread running the merge loop.
pub struct Splicer<T> {
    registry: Arc<Registry<T>>,
    strands: Vec<StrandCursor<T>>,
    last_emitted: Option<DaqTime>,
    started: bool,
    until_sealed: bool,
    finished: bool,
}

impl<T: Flushable> Splicer<T> {
    /// Creates a splicer whose strand queues use the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    /// Creates a splicer with the given strand queue configuration.
    #[must_use]
    pub fn with_config(channel: ChannelConfig) -> Self {
        Self {
            registry: Arc::new(Registry {
                pending: Mutex::new(Vec::new()),
                next_index: AtomicUsize::new(0),
                channel,
                counters: Arc::new(SplicerCounters::default()),
                sealed: AtomicBool::new(false),
                finished: AtomicBool::new(false),
            }),
            strands: Vec::new(),
            last_emitted: None,
            started: false,
            until_sealed: false,
            finished: false,
        }
    }

    /// Keeps the splicer open, even with every strand closed, until
    /// [`seal`](Self::seal) is called.
    #[must_use]
    pub fn until_sealed(mut self) -> Self {
        self.until_sealed = true;
        self
    }

    /// Returns a handle for adding strands from other threads.
    #[must_use]
    pub fn handle(&self) -> SplicerHandle<T> {
        SplicerHandle {
            registry: Arc::clone(&self.registry),
        }
    }

    /// Adds a strand.
    ///
    /// # Errors
    ///
    /// Returns [`SplicerError::Sealed`] once the splicer is sealed or
    /// finished.
    pub fn add_strand(&self) -> Result<StrandTail<T>, SplicerError> {
        self.registry.add_strand()
    }

    /// Stops accepting strands.
    pub fn seal(&self) {
        self.registry.seal();
    }

    /// Stops the merge where it is: refuses new strands and drops every
    /// strand queue, so later pushes fail with
    /// [`SplicerError::Disconnected`]. Returns the number of strands that
    /// were still open.
    pub fn stop(&mut self) -> usize {
        let mut pending = self.registry.pending.lock();
        self.registry.sealed.store(true, Ordering::Release);
        self.registry.finished.store(true, Ordering::Release);
        let open = self.strands.len() + pending.len();
        pending.clear();
        drop(pending);
        self.strands.clear();
        self.finished = true;
        open
    }

    /// Time of the last emitted item.
    #[must_use]
    pub fn last_emitted(&self) -> Option<DaqTime> {
        self.last_emitted
    }

    /// Returns true once the final sentinel has been emitted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> SplicerStats {
        let counters = &self.registry.counters;
        SplicerStats {
            strands_open: self.strands.len() + self.registry.pending.lock().len(),
            strands_added: counters.strands_added.load(Ordering::Relaxed),
            items_emitted: counters.items_emitted.load(Ordering::Relaxed),
            items_rejected: counters.items_rejected.load(Ordering::Relaxed),
        }
    }

    /// Emits the next item if every open strand's head is known.
    ///
    /// Returns `Ok(None)` while stalled or once finished.
    ///
    /// # Errors
    ///
    /// Returns [`SplicerError::LateStrand`] when a strand's item precedes
    /// the last emitted time. The item is dropped and counted; the merge can
    /// continue with the next call.
    pub fn poll_next(&mut self) -> Result<Option<T>, SplicerError> {
        self.adopt_new_strands();
        self.fill_heads()?;
        Ok(self.try_emit())
    }

    /// Like [`poll_next`](Self::poll_next), but waits up to `timeout` for
    /// stalled strands to deliver.
    ///
    /// # Errors
    ///
    /// See [`poll_next`](Self::poll_next).
    pub fn next_timeout(&mut self, timeout: Duration) -> Result<Option<T>, SplicerError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = self.poll_next()? {
                return Ok(Some(item));
            }
            if self.finished {
                return Ok(None);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if !self.wait_for_stalled(remaining)? {
                return Ok(None);
            }
        }
    }

    /// Emits everything that can be emitted without waiting.
    ///
    /// Returns the number of items appended to `out`.
    ///
    /// # Errors
    ///
    /// See [`poll_next`](Self::poll_next). Items emitted before the error
    /// are already in `out`.
    pub fn drain_ready(&mut self, out: &mut Vec<T>) -> Result<usize, SplicerError> {
        let start = out.len();
        while let Some(item) = self.poll_next()? {
            out.push(item);
        }
        Ok(out.len() - start)
    }

    fn adopt_new_strands(&mut self) {
        let mut pending = self.registry.pending.lock();
        if pending.is_empty() {
            return;
        }
        self.started = true;
        self.strands.append(&mut pending);
    }

    /// Pulls queued heads without blocking and drops closed strands.
    fn fill_heads(&mut self) -> Result<(), SplicerError> {
        let mut result = Ok(());
        for i in 0..self.strands.len() {
            if self.strands[i].head.is_some() || self.strands[i].closed {
                continue;
            }
            let polled = self.strands[i].consumer.poll();
            match polled {
                Some(item) => {
                    if let Err(e) = self.accept_head(i, item) {
                        result = Err(e);
                        break;
                    }
                }
                None => {
                    if self.strands[i].consumer.is_disconnected() {
                        self.mark_abandoned(i);
                    }
                }
            }
        }
        self.strands.retain(|c| !c.closed);
        result
    }

    /// Blocks on the first stalled strand. Returns false on timeout.
    fn wait_for_stalled(&mut self, timeout: Duration) -> Result<bool, SplicerError> {
        let Some(i) = self.strands.iter().position(|c| c.head.is_none()) else {
            // Nothing stalled: waiting on strands not yet added.
            std::thread::sleep(timeout.min(Duration::from_millis(1)));
            return Ok(true);
        };
        let outcome = self.strands[i].consumer.recv_timeout(timeout);
        let result = match outcome {
            Ok(item) => self.accept_head(i, item).map(|()| true),
            Err(RecvError::Disconnected) => {
                self.mark_abandoned(i);
                Ok(true)
            }
            Err(RecvError::Timeout) => Ok(false),
        };
        self.strands.retain(|c| !c.closed);
        result
    }

    fn accept_head(&mut self, i: usize, item: T) -> Result<(), SplicerError> {
        let cursor = &mut self.strands[i];
        if item.is_flush() {
            debug!(strand = cursor.index, "strand closed");
            cursor.closed = true;
            return Ok(());
        }
        let time = item.time();
        if let Some(last_emitted) = self.last_emitted {
            if time < last_emitted {
                self.registry
                    .counters
                    .items_rejected
                    .fetch_add(1, Ordering::Relaxed);
                error!(strand = cursor.index, %time, %last_emitted, "late strand item rejected");
                return Err(SplicerError::LateStrand {
                    strand: cursor.index,
                    time,
                    last_emitted,
                });
            }
        }
        cursor.head = Some(item);
        Ok(())
    }

    fn mark_abandoned(&mut self, i: usize) {
        let cursor = &mut self.strands[i];
        warn!(
            strand = cursor.index,
            "strand producer dropped without closing; treating as closed"
        );
        cursor.closed = true;
    }

    fn try_emit(&mut self) -> Option<T> {
        if self.strands.is_empty() {
            if self.finished {
                return None;
            }
            let pending = self.registry.pending.lock();
            let sealed = self.registry.sealed.load(Ordering::Acquire);
            let done = pending.is_empty() && (sealed || (self.started && !self.until_sealed));
            if done {
                self.registry.finished.store(true, Ordering::Release);
                drop(pending);
                self.finished = true;
                info!(
                    items = self.registry.counters.items_emitted.load(Ordering::Relaxed),
                    "all strands closed; splicer finished"
                );
                return Some(T::flush_sentinel());
            }
            return None;
        }
        if self.strands.iter().any(|c| c.head.is_none()) {
            return None;
        }
        let pos = self
            .strands
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| (c.head.as_ref().map_or(DaqTime::MAX, T::time), c.index))
            .map(|(pos, _)| pos)?;
        let item = self.strands[pos].head.take()?;
        self.last_emitted = Some(item.time());
        self.registry
            .counters
            .items_emitted
            .fetch_add(1, Ordering::Relaxed);
        Some(item)
    }
}

impl<T: Flushable> Default for Splicer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timed;
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        time: DaqTime,
        tag: u32,
    }

    impl Item {
        fn new(time: i64, tag: u32) -> Self {
            Self {
                time: DaqTime::new(time),
                tag,
            }
        }
    }

    impl Timed for Item {
        fn time(&self) -> DaqTime {
            self.time
        }
    }

    impl Flushable for Item {
        fn flush_sentinel() -> Self {
            Self {
                time: DaqTime::MAX,
                tag: u32::MAX,
            }
        }
    }

    fn drain(splicer: &mut Splicer<Item>) -> Vec<Item> {
        let mut out = Vec::new();
        splicer.drain_ready(&mut out).unwrap();
        out
    }

    #[test]
    fn test_merges_in_time_order() {
        let mut splicer = Splicer::new();
        let mut a = splicer.add_strand().unwrap();
        let mut b = splicer.add_strand().unwrap();
        let mut c = splicer.add_strand().unwrap();
        for t in [1, 4, 7] {
            a.push(Item::new(t, 0)).unwrap();
        }
        for t in [2, 5, 8] {
            b.push(Item::new(t, 1)).unwrap();
        }
        for t in [3, 6, 9] {
            c.push(Item::new(t, 2)).unwrap();
        }
        a.close().unwrap();
        b.close().unwrap();
        c.close().unwrap();

        let out = drain(&mut splicer);
        let times: Vec<i64> = out.iter().map(|i| i.time.ticks()).collect();
        assert_eq!(times, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, i64::MAX]);
        assert!(splicer.is_finished());
        assert_eq!(splicer.stats().items_emitted, 9);
        assert_eq!(splicer.stats().strands_open, 0);
    }

    #[test]
    fn test_ties_break_by_strand_index() {
        let mut splicer = Splicer::new();
        let mut a = splicer.add_strand().unwrap();
        let mut b = splicer.add_strand().unwrap();
        b.push(Item::new(5, 1)).unwrap();
        a.push(Item::new(5, 0)).unwrap();
        a.close().unwrap();
        b.close().unwrap();

        let tags: Vec<u32> = drain(&mut splicer).iter().map(|i| i.tag).collect();
        assert_eq!(tags, vec![0, 1, u32::MAX]);
    }

    #[test]
    fn test_empty_open_strand_stalls() {
        let mut splicer = Splicer::new();
        let mut a = splicer.add_strand().unwrap();
        let mut b = splicer.add_strand().unwrap();
        a.push(Item::new(1, 0)).unwrap();
        a.push(Item::new(2, 0)).unwrap();
        assert!(drain(&mut splicer).is_empty());

        b.push(Item::new(3, 1)).unwrap();
        let out = drain(&mut splicer);
        assert_eq!(out.len(), 2);
        assert_eq!(splicer.last_emitted(), Some(DaqTime::new(2)));
    }

    #[test]
    fn test_out_of_order_push_rejected() {
        let splicer = Splicer::<Item>::new();
        let mut a = splicer.add_strand().unwrap();
        a.push(Item::new(10, 0)).unwrap();
        let err = a.push(Item::new(9, 0)).unwrap_err();
        assert_eq!(
            err,
            SplicerError::OutOfOrder {
                strand: 0,
                time: DaqTime::new(9),
                previous: DaqTime::new(10)
            }
        );
        assert_eq!(a.last_time(), Some(DaqTime::new(10)));
        assert_eq!(splicer.stats().items_rejected, 1);
    }

    #[test]
    fn test_late_strand_rejected() {
        let mut splicer = Splicer::new();
        let mut a = splicer.add_strand().unwrap();
        a.push(Item::new(100, 0)).unwrap();
        assert_eq!(drain(&mut splicer).len(), 1);

        let mut late = splicer.handle().add_strand().unwrap();
        late.push(Item::new(50, 1)).unwrap();
        late.push(Item::new(300, 1)).unwrap();
        a.push(Item::new(200, 0)).unwrap();
        let err = splicer.poll_next().unwrap_err();
        assert!(matches!(err, SplicerError::LateStrand { strand: 1, .. }));
        assert_eq!(splicer.stats().items_rejected, 1);

        // the merge carries on with the strand's next item
        a.close().unwrap();
        late.close().unwrap();
        let times: Vec<i64> = drain(&mut splicer).iter().map(|i| i.time.ticks()).collect();
        assert_eq!(times, vec![200, 300, i64::MAX]);
    }

    #[test]
    fn test_dropped_tail_counts_as_closed() {
        let mut splicer = Splicer::new();
        let mut a = splicer.add_strand().unwrap();
        a.push(Item::new(1, 0)).unwrap();
        drop(a);
        let out = drain(&mut splicer);
        assert_eq!(out.len(), 2);
        assert!(out[1].is_flush());
    }

    #[test]
    fn test_push_after_close_fails() {
        let splicer = Splicer::<Item>::new();
        let mut a = splicer.add_strand().unwrap();
        a.push(Item::flush_sentinel()).unwrap();
        assert!(a.is_closed());
        assert_eq!(
            a.push(Item::new(1, 0)),
            Err(SplicerError::StrandClosed { strand: 0 })
        );
    }

    #[test]
    fn test_held_open_until_sealed() {
        let mut splicer = Splicer::new().until_sealed();
        let handle = splicer.handle();
        let mut a = handle.add_strand().unwrap();
        a.push(Item::new(10, 0)).unwrap();
        a.close().unwrap();
        assert_eq!(drain(&mut splicer).len(), 1);
        assert!(!splicer.is_finished());

        let mut b = handle.add_strand().unwrap();
        b.push(Item::new(20, 1)).unwrap();
        b.close().unwrap();
        handle.seal();
        let out = drain(&mut splicer);
        assert_eq!(out, vec![Item::new(20, 1), Item::flush_sentinel()]);
        assert!(splicer.is_finished());
        assert_eq!(handle.add_strand().unwrap_err(), SplicerError::Sealed);
    }

    #[test]
    fn test_sealed_without_strands_finishes() {
        let mut splicer = Splicer::<Item>::new().until_sealed();
        assert!(drain(&mut splicer).is_empty());
        splicer.seal();
        let out = drain(&mut splicer);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_flush());
    }

    #[test]
    fn test_finished_splicer_refuses_strands() {
        let mut splicer = Splicer::new();
        let mut a = splicer.add_strand().unwrap();
        a.push(Item::new(1, 0)).unwrap();
        a.close().unwrap();
        assert_eq!(drain(&mut splicer).len(), 2);
        assert!(matches!(splicer.handle().add_strand(), Err(SplicerError::Sealed)));
        assert!(splicer.handle().is_sealed());
    }

    #[test]
    fn test_stop_disconnects_open_strands() {
        let mut splicer = Splicer::new().until_sealed();
        let mut a = splicer.add_strand().unwrap();
        a.push(Item::new(1, 0)).unwrap();
        assert_eq!(splicer.stop(), 1);
        assert!(splicer.is_finished());
        assert_eq!(
            a.push(Item::new(2, 0)),
            Err(SplicerError::Disconnected { strand: 0 })
        );
        assert!(splicer.add_strand().is_err());
    }

    #[test]
    fn test_threaded_producers() {
        let mut splicer = Splicer::with_config(ChannelConfig::with_buffer_size(4));
        let handle = splicer.handle();
        let producers: Vec<_> = (0..4u32)
            .map(|tag| {
                let mut tail = handle.add_strand().unwrap();
                thread::spawn(move || {
                    for t in 0..200 {
                        tail.push(Item::new(t * 4 + i64::from(tag), tag)).unwrap();
                    }
                    tail.close().unwrap();
                })
            })
            .collect();

        let mut out = Vec::new();
        while !splicer.is_finished() {
            if let Some(item) = splicer.next_timeout(Duration::from_millis(50)).unwrap() {
                out.push(item);
            }
        }
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(out.len(), 801);
        assert!(out.windows(2).all(|w| w[0].time <= w[1].time));
    }
}
