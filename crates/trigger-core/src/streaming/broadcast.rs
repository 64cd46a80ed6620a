//! Fan-out of one ordered stream to many subscriber queues.
//!
//! Every subscriber receives every item in the same order. A subscriber
//! that falls behind blocks the producer under `Block` backpressure, so the
//! slowest reader paces the stream.

use tracing::warn;

use super::channel::Producer;
use super::error::StreamingError;

/// Queue depth at which a subscriber is reported as lagging.
pub const DEFAULT_LAG_WARNING_THRESHOLD: usize = 1000;

struct Subscriber<T> {
    name: String,
    producer: Producer<T>,
    lag_warned: bool,
}

/// Sends clones of each item to every subscriber.
pub struct Broadcast<T> {
    subscribers: Vec<Subscriber<T>>,
    lag_warning_threshold: usize,
}

impl<T: Clone> Broadcast<T> {
    /// Creates a fan-out with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            lag_warning_threshold: DEFAULT_LAG_WARNING_THRESHOLD,
        }
    }

    /// Sets the queue depth that triggers a lag warning.
    #[must_use]
    pub fn with_lag_warning_threshold(mut self, threshold: usize) -> Self {
        self.lag_warning_threshold = threshold;
        self
    }

    /// Adds a subscriber queue.
    pub fn subscribe(&mut self, name: impl Into<String>, producer: Producer<T>) {
        self.subscribers.push(Subscriber {
            name: name.into(),
            producer,
            lag_warned: false,
        });
    }

    /// Number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Sends `value` to every subscriber.
    ///
    /// # Errors
    ///
    /// Returns the first push error; subscribers after it do not receive
    /// the value.
    pub fn broadcast(&mut self, value: &T) -> Result<(), StreamingError> {
        let threshold = self.lag_warning_threshold;
        for sub in &mut self.subscribers {
            sub.producer.push(value.clone())?;
            let depth = sub.producer.len();
            if depth >= threshold && !sub.lag_warned {
                warn!(subscriber = %sub.name, depth, "subscriber is lagging");
                sub.lag_warned = true;
            } else if depth < threshold / 2 {
                sub.lag_warned = false;
            }
        }
        Ok(())
    }
}

impl<T: Clone> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}
