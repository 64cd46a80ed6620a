//! Collector configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::payload::SourceId;
use crate::time::nanos_to_ticks;

/// Default wait between polls that finalize nothing.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Configuration for the release collector.
///
/// Widths are in nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Candidates growing wider than this restart from the offending
    /// participant's earliest request. `None` disables the check.
    pub max_interval_width: Option<i64>,

    /// Margin the candidate's end must keep behind the final source's most
    /// recent cached request.
    pub request_width: i64,

    /// Participant whose margin is enforced, by name.
    pub final_source: Option<String>,

    /// Fold overlapping requests of a batch into one merged request.
    pub merge_overlapping: bool,

    /// Source stamped on merged requests.
    pub merged_source: SourceId,

    /// Wait between polls that finalize nothing, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_interval_width: None,
            request_width: 0,
            final_source: None,
            merge_overlapping: false,
            merged_source: SourceId::GLOBAL_TRIGGER,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl CollectorConfig {
    /// Sets the maximum candidate width in ns.
    #[must_use]
    pub fn with_max_interval_width(mut self, nanos: i64) -> Self {
        self.max_interval_width = Some(nanos);
        self
    }

    /// Sets the final-source margin in ns.
    #[must_use]
    pub fn with_request_width(mut self, nanos: i64) -> Self {
        self.request_width = nanos;
        self
    }

    /// Names the participant whose margin is enforced.
    #[must_use]
    pub fn with_final_source(mut self, name: impl Into<String>) -> Self {
        self.final_source = Some(name.into());
        self
    }

    /// Enables merging of overlapping released requests.
    #[must_use]
    pub fn with_merge_overlapping(mut self, merge: bool) -> Self {
        self.merge_overlapping = merge;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Wait between polls that finalize nothing.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Maximum candidate width in ticks.
    #[must_use]
    pub fn max_width_ticks(&self) -> Option<i64> {
        self.max_interval_width.map(nanos_to_ticks)
    }

    /// Final-source margin in ticks.
    #[must_use]
    pub fn request_width_ticks(&self) -> i64 {
        nanos_to_ticks(self.request_width)
    }
}
