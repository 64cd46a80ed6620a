//! # Time Module
//!
//! DAQ tick time, release intervals and watermarks.
//!
//! ## Concepts
//!
//! - **Tick time**: [`DaqTime`], a signed 64-bit count of 0.1 ns ticks. It has
//!   no wall-clock meaning; it is only compared and offset.
//! - **Interval**: [`Interval`], a `[start, end)` span that a participant is
//!   prepared to assert is complete, with an explicit empty state.
//! - **Watermark**: the earliest time an algorithm may still emit a request
//!   for. Tracked per algorithm by [`MonotonicWatermark`] and across
//!   algorithms by [`WatermarkTracker`].
//!
//! ```rust
//! use trigger_core::time::{DaqTime, Interval};
//!
//! let first = DaqTime::from_nanos(100);
//! let last = DaqTime::from_nanos(200);
//! let interval = Interval::covering(first, last);
//!
//! assert_eq!(interval.start(), Some(DaqTime::new(1000)));
//! assert_eq!(interval.end(), Some(DaqTime::new(2001)));
//! assert!(interval.contains_span(first, last));
//! ```

mod interval;
mod watermark;

pub use interval::Interval;
pub use watermark::{MonotonicWatermark, WatermarkTracker};

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Number of ticks in one nanosecond.
pub const TICKS_PER_NANO: i64 = 10;

/// A point in DAQ time, measured in 0.1 ns ticks.
///
/// `DaqTime::MAX` is reserved for the flush sentinel: it compares greater
/// than any time a real payload can carry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DaqTime(pub i64);

impl DaqTime {
    /// Start of a run.
    pub const ZERO: Self = Self(0);

    /// The flush time, later than any real payload.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates a time from a raw tick count.
    #[inline]
    #[must_use]
    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Creates a time from nanoseconds.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos.saturating_mul(TICKS_PER_NANO))
    }

    /// Returns the raw tick count.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Returns true if this is the flush time.
    #[inline]
    #[must_use]
    pub const fn is_flush(self) -> bool {
        self.0 == i64::MAX
    }

    /// Adds a tick offset, saturating at the bounds.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, ticks: i64) -> Self {
        Self(self.0.saturating_add(ticks))
    }

    /// Subtracts a tick offset, saturating at the bounds.
    #[inline]
    #[must_use]
    pub const fn saturating_sub(self, ticks: i64) -> Self {
        Self(self.0.saturating_sub(ticks))
    }

    /// Ticks elapsed from `earlier` to `self`.
    #[inline]
    #[must_use]
    pub const fn since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// The next representable tick (`self + 1`), saturating.
    #[inline]
    #[must_use]
    pub const fn next_tick(self) -> Self {
        self.saturating_add(1)
    }
}

impl Add<i64> for DaqTime {
    type Output = Self;

    fn add(self, ticks: i64) -> Self {
        self.saturating_add(ticks)
    }
}

impl Sub<i64> for DaqTime {
    type Output = Self;

    fn sub(self, ticks: i64) -> Self {
        self.saturating_sub(ticks)
    }
}

impl Sub for DaqTime {
    type Output = i64;

    fn sub(self, other: Self) -> i64 {
        self.since(other)
    }
}

impl From<i64> for DaqTime {
    fn from(ticks: i64) -> Self {
        Self(ticks)
    }
}

impl From<DaqTime> for i64 {
    fn from(time: DaqTime) -> Self {
        time.0
    }
}

impl fmt::Display for DaqTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_flush() {
            write!(f, "FLUSH")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Converts a nanosecond duration to ticks.
#[inline]
#[must_use]
pub const fn nanos_to_ticks(nanos: i64) -> i64 {
    nanos.saturating_mul(TICKS_PER_NANO)
}

/// Anything that carries a DAQ time and can be merged by time.
pub trait Timed {
    /// The time used for ordering.
    fn time(&self) -> DaqTime;
}

/// A timed item type with a distinguished end-of-stream value.
///
/// The flush value must report [`DaqTime::MAX`] as its time.
pub trait Flushable: Timed + Sized {
    /// Creates the end-of-stream sentinel.
    fn flush_sentinel() -> Self;

    /// Returns true if this item is the end-of-stream sentinel.
    fn is_flush(&self) -> bool {
        self.time().is_flush()
    }
}
