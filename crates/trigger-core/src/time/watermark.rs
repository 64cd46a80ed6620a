//! Watermark tracking.
//!
//! A watermark is the earliest time an algorithm may still emit a request
//! for: every request it emits later has a first time at or after its
//! current watermark. Watermarks only move forward, except on an explicit
//! run reset.
//!
//! # Example
//!
//! ```rust
//! use trigger_core::time::{DaqTime, MonotonicWatermark, WatermarkTracker};
//!
//! let mut wm = MonotonicWatermark::new();
//! assert!(wm.advance(DaqTime::new(500)));
//! assert!(!wm.advance(DaqTime::new(400))); // never moves back
//! assert_eq!(wm.current(), DaqTime::new(500));
//!
//! let mut tracker = WatermarkTracker::new(2);
//! tracker.update(0, DaqTime::new(5000));
//! tracker.update(1, DaqTime::new(3000));
//! assert_eq!(tracker.combined(), DaqTime::new(3000));
//! ```

use super::DaqTime;

/// A single participant's watermark, which never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonotonicWatermark {
    current: DaqTime,
}

impl MonotonicWatermark {
    /// Creates a watermark at the start of the run.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: DaqTime::ZERO,
        }
    }

    /// Returns the current watermark.
    #[inline]
    #[must_use]
    pub fn current(&self) -> DaqTime {
        self.current
    }

    /// Moves the watermark to `candidate` if that is later.
    ///
    /// Returns true if the watermark advanced.
    #[inline]
    pub fn advance(&mut self, candidate: DaqTime) -> bool {
        if candidate > self.current {
            self.current = candidate;
            true
        } else {
            false
        }
    }

    /// Marks the participant as finished: nothing more will be emitted.
    pub fn finish(&mut self) {
        self.current = DaqTime::MAX;
    }

    /// Returns true once [`finish`](Self::finish) has been called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.current.is_flush()
    }

    /// Run-boundary reset back to zero.
    pub fn reset(&mut self) {
        self.current = DaqTime::ZERO;
    }
}

/// Tracks the combined (minimum) watermark across participants.
///
/// The collector uses this to report how far the whole trigger tier has
/// progressed; no participant can still produce a request earlier than the
/// combined watermark.
#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    /// Watermark for each participant
    participant_watermarks: Vec<DaqTime>,
    /// Combined minimum watermark
    combined: DaqTime,
}

impl WatermarkTracker {
    /// Creates a tracker for `participants` participants, all at zero.
    #[must_use]
    pub fn new(participants: usize) -> Self {
        Self {
            participant_watermarks: vec![DaqTime::ZERO; participants],
            combined: DaqTime::ZERO,
        }
    }

    /// Records a participant's watermark.
    ///
    /// Returns `Some(combined)` if the combined watermark advanced.
    pub fn update(&mut self, participant: usize, watermark: DaqTime) -> Option<DaqTime> {
        let slot = self.participant_watermarks.get_mut(participant)?;
        if watermark > *slot {
            *slot = watermark;
            self.update_combined()
        } else {
            None
        }
    }

    /// Returns the combined watermark.
    #[must_use]
    pub fn combined(&self) -> DaqTime {
        self.combined
    }

    /// Returns one participant's last recorded watermark.
    #[must_use]
    pub fn participant(&self, participant: usize) -> Option<DaqTime> {
        self.participant_watermarks.get(participant).copied()
    }

    /// Returns true once every participant is finished.
    #[must_use]
    pub fn all_finished(&self) -> bool {
        self.participant_watermarks.iter().all(|wm| wm.is_flush())
    }

    /// Returns the number of participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participant_watermarks.len()
    }

    /// Returns true if no participants are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participant_watermarks.is_empty()
    }

    /// Run-boundary reset.
    pub fn reset(&mut self) {
        self.participant_watermarks.fill(DaqTime::ZERO);
        self.combined = DaqTime::ZERO;
    }

    fn update_combined(&mut self) -> Option<DaqTime> {
        let min = self
            .participant_watermarks
            .iter()
            .copied()
            .min()
            .unwrap_or(DaqTime::ZERO);
        if min > self.combined {
            self.combined = min;
            Some(min)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_ignores_regression() {
        let mut wm = MonotonicWatermark::new();
        assert!(wm.advance(DaqTime::new(100)));
        assert!(!wm.advance(DaqTime::new(100)));
        assert!(!wm.advance(DaqTime::new(50)));
        assert_eq!(wm.current(), DaqTime::new(100));
    }

    #[test]
    fn test_monotonic_finish_and_reset() {
        let mut wm = MonotonicWatermark::new();
        wm.advance(DaqTime::new(10));
        wm.finish();
        assert!(wm.is_finished());
        assert!(!wm.advance(DaqTime::new(1_000_000)));

        wm.reset();
        assert_eq!(wm.current(), DaqTime::ZERO);
        assert!(!wm.is_finished());
    }

    #[test]
    fn test_tracker_min_semantics() {
        let mut tracker = WatermarkTracker::new(3);
        assert_eq!(tracker.update(0, DaqTime::new(100)), None);
        assert_eq!(tracker.update(1, DaqTime::new(200)), None);
        assert_eq!(tracker.update(2, DaqTime::new(50)), Some(DaqTime::new(50)));
        assert_eq!(tracker.update(2, DaqTime::new(500)), Some(DaqTime::new(100)));
        assert_eq!(tracker.combined(), DaqTime::new(100));
    }

    #[test]
    fn test_tracker_ignores_unknown_and_backwards() {
        let mut tracker = WatermarkTracker::new(1);
        assert_eq!(tracker.update(5, DaqTime::new(100)), None);
        tracker.update(0, DaqTime::new(100));
        assert_eq!(tracker.update(0, DaqTime::new(10)), None);
        assert_eq!(tracker.participant(0), Some(DaqTime::new(100)));
    }

    #[test]
    fn test_tracker_all_finished() {
        let mut tracker = WatermarkTracker::new(2);
        tracker.update(0, DaqTime::MAX);
        assert!(!tracker.all_finished());
        tracker.update(1, DaqTime::MAX);
        assert!(tracker.all_finished());
        assert_eq!(tracker.combined(), DaqTime::MAX);

        tracker.reset();
        assert_eq!(tracker.combined(), DaqTime::ZERO);
    }
}
