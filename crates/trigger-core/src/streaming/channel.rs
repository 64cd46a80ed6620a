//! Bounded blocking channels.
//!
//! A channel starts with one [`Producer`] and one [`Consumer`]. Cloning the
//! producer gives additional senders into the same queue (MPSC); the channel
//! disconnects when the last producer drops, after the consumer has drained
//! whatever is queued. Dropping the consumer closes the channel for
//! producers, so a blocked push never hangs on a dead reader.
//!
//! ```rust
//! use trigger_core::streaming::channel;
//!
//! let (producer, consumer) = channel::<u64>(16);
//! let second = producer.clone();
//!
//! producer.push(1).unwrap();
//! second.push(2).unwrap();
//! drop(producer);
//! drop(second);
//!
//! assert_eq!(consumer.recv(), Ok(1));
//! assert_eq!(consumer.recv(), Ok(2));
//! assert!(consumer.recv().is_err());
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::config::{BackpressureStrategy, ChannelConfig, ChannelStats};
use super::error::{RecvError, StreamingError, TryPushError};

struct State<T> {
    queue: VecDeque<T>,
    consumer_alive: bool,
}

struct ChannelInner<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    producer_count: AtomicUsize,
    capacity: usize,
    backpressure: BackpressureStrategy,
    stats: ChannelStatsInner,
}

#[derive(Default)]
struct ChannelStatsInner {
    items_pushed: AtomicU64,
    items_popped: AtomicU64,
    push_blocked: AtomicU64,
    items_dropped: AtomicU64,
}

impl ChannelStatsInner {
    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            items_pushed: self.items_pushed.load(Ordering::Relaxed),
            items_popped: self.items_popped.load(Ordering::Relaxed),
            push_blocked: self.push_blocked.load(Ordering::Relaxed),
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
        }
    }
}

impl<T> ChannelInner<T> {
    fn new(config: &ChannelConfig) -> Self {
        let capacity = config.effective_buffer_size();
        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity.min(1024)),
                consumer_alive: true,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            producer_count: AtomicUsize::new(1),
            capacity,
            backpressure: config.backpressure,
            stats: ChannelStatsInner::default(),
        }
    }

    #[inline]
    fn producers_gone(&self) -> bool {
        self.producer_count.load(Ordering::Acquire) == 0
    }

    fn enqueue(&self, state: &mut State<T>, item: T) {
        state.queue.push_back(item);
        self.stats.items_pushed.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
    }

    fn dequeue(&self, state: &mut State<T>) -> Option<T> {
        let item = state.queue.pop_front()?;
        self.stats.items_popped.fetch_add(1, Ordering::Relaxed);
        self.not_full.notify_one();
        Some(item)
    }
}

/// Sending half of a channel. Clone for more senders.
pub struct Producer<T> {
    inner: Arc<ChannelInner<T>>,
}

impl<T> Producer<T> {
    /// Pushes an item, applying the channel's backpressure strategy when full.
    ///
    /// - `Block`: waits until space is available
    /// - `DropOldest`: discards the oldest queued item
    /// - `Reject`: returns [`StreamingError::ChannelFull`]
    ///
    /// # Errors
    ///
    /// Returns [`StreamingError::ChannelClosed`] if the consumer has dropped,
    /// or [`StreamingError::ChannelFull`] under `Reject`.
    pub fn push(&self, item: T) -> Result<(), StreamingError> {
        let mut state = self.inner.state.lock();
        if !state.consumer_alive {
            return Err(StreamingError::ChannelClosed);
        }
        if state.queue.len() >= self.inner.capacity {
            match self.inner.backpressure {
                BackpressureStrategy::Block => {
                    self.inner.stats.push_blocked.fetch_add(1, Ordering::Relaxed);
                    while state.queue.len() >= self.inner.capacity && state.consumer_alive {
                        self.inner.not_full.wait(&mut state);
                    }
                    if !state.consumer_alive {
                        return Err(StreamingError::ChannelClosed);
                    }
                }
                BackpressureStrategy::DropOldest => {
                    state.queue.pop_front();
                    self.inner.stats.items_dropped.fetch_add(1, Ordering::Relaxed);
                }
                BackpressureStrategy::Reject => {
                    return Err(StreamingError::ChannelFull {
                        capacity: self.inner.capacity,
                    })
                }
            }
        }
        self.inner.enqueue(&mut state, item);
        Ok(())
    }

    /// Pushes without blocking, handing the item back on failure.
    ///
    /// # Errors
    ///
    /// Returns [`TryPushError`] if the channel is full or closed.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        let mut state = self.inner.state.lock();
        if !state.consumer_alive {
            return Err(TryPushError::Closed(item));
        }
        if state.queue.len() >= self.inner.capacity {
            return Err(TryPushError::Full(item));
        }
        self.inner.enqueue(&mut state, item);
        Ok(())
    }

    /// Returns true once the consumer has dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.inner.state.lock().consumer_alive
    }

    /// Returns true if more than one producer is alive.
    #[must_use]
    pub fn is_mpsc(&self) -> bool {
        self.inner.producer_count.load(Ordering::Acquire) > 1
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Channel counters.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.inner.stats.snapshot()
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        self.inner.producer_count.fetch_add(1, Ordering::AcqRel);
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        let prev = self.inner.producer_count.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            // Take the lock so a consumer between its check and its wait
            // cannot miss the wakeup.
            let _state = self.inner.state.lock();
            self.inner.not_empty.notify_all();
        }
    }
}

impl<T> std::fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("is_closed", &self.is_closed())
            .finish()
    }
}

/// Receiving half of a channel.
pub struct Consumer<T> {
    inner: Arc<ChannelInner<T>>,
}

impl<T> Consumer<T> {
    /// Takes the next item without blocking.
    #[must_use]
    pub fn poll(&self) -> Option<T> {
        let mut state = self.inner.state.lock();
        self.inner.dequeue(&mut state)
    }

    /// Receives the next item, blocking until one arrives.
    ///
    /// # Errors
    ///
    /// Returns [`RecvError::Disconnected`] once every producer has dropped
    /// and the queue is drained.
    pub fn recv(&self) -> Result<T, RecvError> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(item) = self.inner.dequeue(&mut state) {
                return Ok(item);
            }
            if self.inner.producers_gone() {
                return Err(RecvError::Disconnected);
            }
            self.inner.not_empty.wait(&mut state);
        }
    }

    /// Receives the next item, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RecvError::Timeout`] if nothing arrives in time, or
    /// [`RecvError::Disconnected`] once every producer has dropped.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if let Some(item) = self.inner.dequeue(&mut state) {
                return Ok(item);
            }
            if self.inner.producers_gone() {
                return Err(RecvError::Disconnected);
            }
            if self
                .inner
                .not_empty
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return self
                    .inner
                    .dequeue(&mut state)
                    .ok_or(RecvError::Timeout);
            }
        }
    }

    /// Moves up to `max_count` queued items into `buffer` without blocking.
    ///
    /// Returns the number of items moved.
    pub fn pop_batch_into(&self, buffer: &mut Vec<T>, max_count: usize) -> usize {
        let mut state = self.inner.state.lock();
        let mut count = 0;
        while count < max_count {
            match self.inner.dequeue(&mut state) {
                Some(item) => {
                    buffer.push(item);
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Returns true once every producer has dropped and the queue is empty.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.inner.producers_gone() && self.is_empty()
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Channel counters.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.inner.stats.snapshot()
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.consumer_alive = false;
        self.inner.not_full.notify_all();
    }
}

impl<T> std::fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("is_disconnected", &self.is_disconnected())
            .finish()
    }
}

impl<T> Iterator for Consumer<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv().ok()
    }
}

/// Creates a blocking channel holding at most `buffer_size` items.
#[must_use]
pub fn channel<T>(buffer_size: usize) -> (Producer<T>, Consumer<T>) {
    channel_with_config(&ChannelConfig::with_buffer_size(buffer_size))
}

/// Creates a channel with custom configuration.
#[must_use]
pub fn channel_with_config<T>(config: &ChannelConfig) -> (Producer<T>, Consumer<T>) {
    let inner = Arc::new(ChannelInner::new(config));
    let producer = Producer {
        inner: Arc::clone(&inner),
    };
    (producer, Consumer { inner })
}
