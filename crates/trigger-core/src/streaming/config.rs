//! Channel configuration.

use serde::{Deserialize, Serialize};

/// Default queue depth.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Minimum queue depth.
pub const MIN_BUFFER_SIZE: usize = 1;

/// Maximum queue depth.
pub const MAX_BUFFER_SIZE: usize = 1 << 20;

/// What a producer does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureStrategy {
    /// Block until space is available. Nothing is lost.
    #[default]
    Block,

    /// Drop the oldest queued item to make room, counting the drop.
    DropOldest,

    /// Reject the push and return an error immediately.
    Reject,
}

/// Configuration for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Maximum number of queued items.
    pub buffer_size: usize,

    /// Full-queue behaviour.
    pub backpressure: BackpressureStrategy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            backpressure: BackpressureStrategy::Block,
        }
    }
}

impl ChannelConfig {
    /// Configuration with the given depth and blocking backpressure.
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE),
            ..Default::default()
        }
    }

    /// Sets the backpressure strategy.
    #[must_use]
    pub fn backpressure(mut self, strategy: BackpressureStrategy) -> Self {
        self.backpressure = strategy;
        self
    }

    /// Depth actually used, clamped to the supported range.
    #[must_use]
    pub fn effective_buffer_size(&self) -> usize {
        self.buffer_size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)
    }
}

/// Channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Items pushed.
    pub items_pushed: u64,

    /// Items popped.
    pub items_popped: u64,

    /// Times a push had to wait for space.
    pub push_blocked: u64,

    /// Items dropped by `DropOldest`.
    pub items_dropped: u64,
}

impl ChannelStats {
    /// Items pushed but neither popped nor dropped.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.items_pushed
            .saturating_sub(self.items_popped)
            .saturating_sub(self.items_dropped)
    }
}
