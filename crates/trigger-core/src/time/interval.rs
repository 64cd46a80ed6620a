//! Release intervals.

use std::fmt;

use super::DaqTime;

/// A `[start, end)` span of DAQ time, possibly empty.
///
/// A payload spanning `[first, last]` (both inclusive) lies inside the
/// interval when `start <= first` and `last < end`. Covering such a payload
/// widens the interval to `[min(start, first), max(end, last + 1))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interval {
    bounds: Option<(DaqTime, DaqTime)>,
}

impl Interval {
    /// The empty interval.
    pub const EMPTY: Self = Self { bounds: None };

    /// Creates `[start, end)`. Returns the empty interval when `end <= start`.
    #[must_use]
    pub fn new(start: DaqTime, end: DaqTime) -> Self {
        if end <= start {
            Self::EMPTY
        } else {
            Self {
                bounds: Some((start, end)),
            }
        }
    }

    /// The smallest interval holding the inclusive span `[first, last]`.
    #[must_use]
    pub fn covering(first: DaqTime, last: DaqTime) -> Self {
        let (lo, hi) = if first <= last {
            (first, last)
        } else {
            (last, first)
        };
        Self {
            bounds: Some((lo, hi.next_tick())),
        }
    }

    /// Returns true if the interval is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    /// Inclusive start, if not empty.
    #[inline]
    #[must_use]
    pub fn start(&self) -> Option<DaqTime> {
        self.bounds.map(|(s, _)| s)
    }

    /// Exclusive end, if not empty.
    #[inline]
    #[must_use]
    pub fn end(&self) -> Option<DaqTime> {
        self.bounds.map(|(_, e)| e)
    }

    /// Width in ticks; zero when empty.
    #[must_use]
    pub fn width(&self) -> i64 {
        self.bounds.map_or(0, |(s, e)| e.since(s))
    }

    /// Returns true if the inclusive span `[first, last]` lies inside.
    #[must_use]
    pub fn contains_span(&self, first: DaqTime, last: DaqTime) -> bool {
        match self.bounds {
            Some((s, e)) => s <= first && last < e,
            None => false,
        }
    }

    /// Returns true if the inclusive span `[first, last]` shares a tick with
    /// this interval.
    #[must_use]
    pub fn overlaps_span(&self, first: DaqTime, last: DaqTime) -> bool {
        match self.bounds {
            Some((s, e)) => first < e && last >= s,
            None => false,
        }
    }

    /// Returns true if the inclusive span ends before this interval starts.
    #[must_use]
    pub fn is_after_span(&self, last: DaqTime) -> bool {
        match self.bounds {
            Some((s, _)) => last < s,
            None => false,
        }
    }

    /// Widens the interval to also cover the inclusive span.
    #[must_use]
    pub fn cover(self, first: DaqTime, last: DaqTime) -> Self {
        let span = Self::covering(first, last);
        self.union(span)
    }

    /// Smallest interval covering both.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        match (self.bounds, other.bounds) {
            (None, _) => other,
            (_, None) => self,
            (Some((s1, e1)), Some((s2, e2))) => Self {
                bounds: Some((s1.min(s2), e1.max(e2))),
            },
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bounds {
            Some((s, e)) => write!(f, "[{s}, {e})"),
            None => write!(f, "[empty]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ticks: i64) -> DaqTime {
        DaqTime::new(ticks)
    }

    #[test]
    fn test_new_rejects_inverted_bounds() {
        assert!(Interval::new(t(10), t(10)).is_empty());
        assert!(Interval::new(t(10), t(5)).is_empty());
        assert_eq!(Interval::new(t(5), t(10)).width(), 5);
    }

    #[test]
    fn test_covering_is_inclusive_of_last() {
        let iv = Interval::covering(t(100), t(200));
        assert_eq!(iv.start(), Some(t(100)));
        assert_eq!(iv.end(), Some(t(201)));
        assert!(iv.contains_span(t(100), t(200)));
        assert!(!iv.contains_span(t(100), t(201)));
    }

    #[test]
    fn test_overlap() {
        let iv = Interval::new(t(100), t(200));
        assert!(iv.overlaps_span(t(50), t(100)));
        assert!(iv.overlaps_span(t(199), t(300)));
        assert!(!iv.overlaps_span(t(200), t(300)));
        assert!(!iv.overlaps_span(t(0), t(99)));
        assert!(!Interval::EMPTY.overlaps_span(t(0), t(1000)));
    }

    #[test]
    fn test_cover_and_union() {
        let iv = Interval::EMPTY.cover(t(100), t(150));
        assert_eq!(iv, Interval::new(t(100), t(151)));

        let wider = iv.cover(t(50), t(120));
        assert_eq!(wider, Interval::new(t(50), t(151)));

        assert_eq!(Interval::EMPTY.union(Interval::EMPTY), Interval::EMPTY);
    }

    #[test]
    fn test_display() {
        assert_eq!(Interval::new(t(1), t(3)).to_string(), "[1, 3)");
        assert_eq!(Interval::EMPTY.to_string(), "[empty]");
    }
}
