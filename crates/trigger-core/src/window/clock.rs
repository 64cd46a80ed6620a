//! Counters that replace the threshold test in instantaneous and periodic
//! triggers.

use crate::time::{nanos_to_ticks, DaqTime};

/// Fires on every `prescale`-th tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prescaler {
    prescale: u64,
    count: u64,
}

impl Prescaler {
    /// Creates a prescaler. A prescale of zero behaves like one.
    #[must_use]
    pub const fn new(prescale: u64) -> Self {
        Self { prescale, count: 0 }
    }

    /// Counts one accepted input; returns true when it fires.
    #[inline]
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.prescale {
            self.count = 0;
            true
        } else {
            false
        }
    }

    /// Inputs counted since the last firing.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.count
    }

    /// Restarts the count.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}

/// A fixed-period clock sampled by stream time.
///
/// The first sample arms the clock one period later; each sample then
/// yields every tick at or before the sampled time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRateClock {
    period: i64,
    next: Option<DaqTime>,
}

impl FixedRateClock {
    /// Creates a clock with a period in ns.
    #[must_use]
    pub const fn new(period_ns: i64) -> Self {
        Self {
            period: nanos_to_ticks(period_ns),
            next: None,
        }
    }

    /// Next tick, once armed.
    #[must_use]
    pub fn next_tick(&self) -> Option<DaqTime> {
        self.next
    }

    /// Samples the clock at `now`, returning the ticks that elapsed.
    pub fn sample(&mut self, now: DaqTime) -> Vec<DaqTime> {
        let mut ticks = Vec::new();
        let Some(mut next) = self.next else {
            self.next = Some(now.saturating_add(self.period));
            return ticks;
        };
        while self.period > 0 && next <= now {
            ticks.push(next);
            next = next.saturating_add(self.period);
        }
        self.next = Some(next);
        ticks
    }

    /// Disarms the clock.
    pub fn reset(&mut self) {
        self.next = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prescaler_fires_every_nth() {
        let mut p = Prescaler::new(3);
        let fired: Vec<bool> = (0..7).map(|_| p.tick()).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true, false]);
        assert_eq!(p.pending(), 1);
        p.reset();
        assert_eq!(p.pending(), 0);
    }

    #[test]
    fn test_prescale_one_fires_always() {
        let mut p = Prescaler::new(1);
        assert!(p.tick());
        assert!(p.tick());
    }

    #[test]
    fn test_clock_arms_on_first_sample() {
        let mut clock = FixedRateClock::new(100);
        assert!(clock.sample(DaqTime::new(50)).is_empty());
        assert_eq!(clock.next_tick(), Some(DaqTime::new(1050)));
        assert!(clock.sample(DaqTime::new(1049)).is_empty());
        assert_eq!(clock.sample(DaqTime::new(1050)), vec![DaqTime::new(1050)]);
        assert_eq!(
            clock.sample(DaqTime::new(3100)),
            vec![DaqTime::new(2050), DaqTime::new(3050)]
        );
        assert_eq!(clock.next_tick(), Some(DaqTime::new(4050)));
    }
}
