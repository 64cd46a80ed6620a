//! # Window Module
//!
//! The sliding-window state machine most trigger algorithms instantiate.
//!
//! ## States
//!
//! ```text
//!   Idle ──hit──▶ Accumulating ──condition met──▶ OnTrigger
//!    ▲                 │  ▲                           │
//!    └──window empties─┘  └────── terminate & emit ───┘
//! ```
//!
//! For every hit at time `T`:
//!
//! 1. evict window hits with `time + window < T`;
//! 2. on trigger, terminate once the trigger's first hit has been evicted and
//!    either the condition no longer holds or the threshold is one. The
//!    request spans the trigger hits; trigger and window are cleared so a hit
//!    contributes to at most one request;
//! 3. insert the hit (accepted hits only);
//! 4. enter `OnTrigger` when the condition becomes true, or extend the
//!    trigger;
//! 5. publish the watermark: the window front, or `T` for an empty window,
//!    held while on trigger.
//!
//! The condition is pluggable through [`WindowCondition`]: plain
//! multiplicity ([`Multiplicity`]) or spatial clustering
//! ([`ClusterCondition`]).

mod clock;
mod condition;
mod filter;

pub use clock::{FixedRateClock, Prescaler};
pub use condition::{ClusterCondition, Multiplicity, WindowCondition};
pub use filter::HitFilter;

use std::collections::VecDeque;

use crate::algorithm::{AlgorithmCore, AlgorithmError};
use crate::payload::Hit;
use crate::time::{nanos_to_ticks, DaqTime};

/// Where the window state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// No hits held.
    Idle,
    /// Hits held, condition not met.
    Accumulating,
    /// Condition met; collecting the trigger.
    OnTrigger,
}

/// Sliding time window over accepted hits.
#[derive(Debug)]
pub struct SlidingWindow<C> {
    time_window: i64,
    condition: C,
    window: VecDeque<Hit>,
    trigger: Vec<Hit>,
    on_trigger: bool,
    first_evicted: bool,
    leading_edge: Option<DaqTime>,
}

impl<C: WindowCondition> SlidingWindow<C> {
    /// Creates a window `time_window_ns` nanoseconds long.
    #[must_use]
    pub fn new(time_window_ns: i64, condition: C) -> Self {
        Self {
            time_window: nanos_to_ticks(time_window_ns),
            condition,
            window: VecDeque::new(),
            trigger: Vec::new(),
            on_trigger: false,
            first_evicted: false,
            leading_edge: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WindowState {
        if self.on_trigger {
            WindowState::OnTrigger
        } else if self.window.is_empty() {
            WindowState::Idle
        } else {
            WindowState::Accumulating
        }
    }

    /// Window length in ticks.
    #[must_use]
    pub fn time_window(&self) -> i64 {
        self.time_window
    }

    /// The trigger condition.
    #[must_use]
    pub fn condition(&self) -> &C {
        &self.condition
    }

    /// Hits currently in the sliding window.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Hits collected for the current trigger.
    #[must_use]
    pub fn trigger_len(&self) -> usize {
        self.trigger.len()
    }

    /// Time of the last hit seen.
    #[must_use]
    pub fn leading_edge(&self) -> Option<DaqTime> {
        self.leading_edge
    }

    /// Processes an accepted hit.
    ///
    /// # Errors
    ///
    /// Returns [`AlgorithmError::OutOfOrder`] for a hit earlier than the
    /// leading edge, or any error raised while emitting.
    pub fn process_hit(&mut self, core: &mut AlgorithmCore, hit: Hit) -> Result<(), AlgorithmError> {
        self.slide(core, hit.time)?;
        self.window.push_back(hit);
        if self.on_trigger {
            self.trigger.push(hit);
        } else if self.condition.is_met(&self.window) {
            self.on_trigger = true;
            self.first_evicted = false;
            self.trigger.extend(self.window.iter().copied());
        }
        self.publish_watermark(core, hit.time);
        Ok(())
    }

    /// Routes a hit through `filter`: accepted hits are processed, rejected
    /// hits are counted and only advance time.
    ///
    /// # Errors
    ///
    /// Same as [`process_hit`](Self::process_hit).
    pub fn offer(
        &mut self,
        core: &mut AlgorithmCore,
        filter: &HitFilter,
        hit: Hit,
    ) -> Result<(), AlgorithmError> {
        if filter.accepts(&hit) {
            self.process_hit(core, hit)
        } else {
            core.count_rejected();
            self.advance_time(core, hit.time)
        }
    }

    /// Advances time for a hit that failed the acceptance predicate.
    ///
    /// The window still slides and may terminate a trigger, but nothing is
    /// inserted.
    ///
    /// # Errors
    ///
    /// Same as [`process_hit`](Self::process_hit).
    pub fn advance_time(&mut self, core: &mut AlgorithmCore, time: DaqTime) -> Result<(), AlgorithmError> {
        self.slide(core, time)?;
        self.publish_watermark(core, time);
        Ok(())
    }

    /// Finalizes at end of stream.
    ///
    /// An open trigger is emitted; otherwise a window that alone meets the
    /// condition is promoted and emitted; otherwise the window is discarded.
    ///
    /// # Errors
    ///
    /// Returns any error raised while emitting.
    pub fn flush(&mut self, core: &mut AlgorithmCore) -> Result<(), AlgorithmError> {
        if !self.on_trigger && self.condition.is_met(&self.window) {
            self.on_trigger = true;
            self.trigger.extend(self.window.iter().copied());
        }
        if self.on_trigger {
            self.emit(core)?;
        }
        self.window.clear();
        Ok(())
    }

    /// Drops all state for a new run.
    pub fn reset(&mut self) {
        self.window.clear();
        self.trigger.clear();
        self.on_trigger = false;
        self.first_evicted = false;
        self.leading_edge = None;
    }

    fn slide(&mut self, core: &mut AlgorithmCore, time: DaqTime) -> Result<(), AlgorithmError> {
        if let Some(edge) = self.leading_edge {
            if time < edge {
                return Err(core.out_of_order(time, edge));
            }
        }
        self.leading_edge = Some(time);

        while let Some(front) = self.window.front() {
            if front.time.saturating_add(self.time_window) >= time {
                break;
            }
            self.window.pop_front();
            if self.on_trigger {
                self.first_evicted = true;
            }
        }

        if self.on_trigger
            && self.first_evicted
            && (self.condition.threshold() == 1 || !self.condition.is_met(&self.window))
        {
            self.emit(core)?;
        }
        Ok(())
    }

    fn emit(&mut self, core: &mut AlgorithmCore) -> Result<(), AlgorithmError> {
        let hits = self.condition.select(std::mem::take(&mut self.trigger));
        self.on_trigger = false;
        self.first_evicted = false;
        self.window.clear();
        let (Some(first), Some(last)) = (hits.first(), hits.last()) else {
            return Err(core.empty_trigger());
        };
        let (first, last) = (first.time, last.time);
        core.emit(first, last, hits)
    }

    fn publish_watermark(&self, core: &mut AlgorithmCore, time: DaqTime) {
        if self.on_trigger {
            return;
        }
        let bound = self.window.front().map_or(time, |h| h.time);
        core.advance_watermark(bound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AlgorithmConfig;
    use crate::payload::{ChannelId, SourceId, TriggerKey, TriggerRequest};

    fn core() -> AlgorithmCore {
        let config = AlgorithmConfig::new(
            "window",
            "SimpleMajorityTrigger",
            TriggerKey::new(0, 0, SourceId::IN_ICE_TRIGGER),
        );
        AlgorithmCore::new(&config, 0)
    }

    fn hit_ns(ns: i64) -> Hit {
        Hit::spe(DaqTime::from_nanos(ns), ChannelId::new(1, 1))
    }

    fn spans(core: &AlgorithmCore) -> Vec<(i64, i64)> {
        core.cache()
            .iter()
            .map(|r: &TriggerRequest| (r.first_time().ticks(), r.last_time().ticks()))
            .collect()
    }

    #[test]
    fn test_threshold_excludes_late_hit() {
        let mut core = core();
        let mut window = SlidingWindow::new(250, Multiplicity::new(3));
        for ns in [0, 100, 200, 300] {
            window.process_hit(&mut core, hit_ns(ns)).unwrap();
        }
        window.flush(&mut core).unwrap();
        assert_eq!(spans(&core), vec![(0, 2000)]);
        assert_eq!(core.cache().iter().next().unwrap().hits().len(), 3);
    }

    #[test]
    fn test_state_transitions() {
        let mut core = core();
        let mut window = SlidingWindow::new(100, Multiplicity::new(2));
        assert_eq!(window.state(), WindowState::Idle);
        window.process_hit(&mut core, hit_ns(0)).unwrap();
        assert_eq!(window.state(), WindowState::Accumulating);
        window.process_hit(&mut core, hit_ns(50)).unwrap();
        assert_eq!(window.state(), WindowState::OnTrigger);
        window.process_hit(&mut core, hit_ns(90)).unwrap();
        assert_eq!(window.state(), WindowState::OnTrigger);
        assert_eq!(window.trigger_len(), 3);
        window.process_hit(&mut core, hit_ns(200)).unwrap();
        assert_eq!(spans(&core), vec![(0, 900)]);
        assert_eq!(window.state(), WindowState::Accumulating);
        assert_eq!(window.window_len(), 1);
    }

    #[test]
    fn test_trigger_extends_while_condition_holds() {
        let mut core = core();
        let mut window = SlidingWindow::new(100, Multiplicity::new(2));
        for ns in [0, 40, 80, 120, 160] {
            window.process_hit(&mut core, hit_ns(ns)).unwrap();
        }
        assert!(core.cache().is_empty());
        window.process_hit(&mut core, hit_ns(1000)).unwrap();
        assert_eq!(spans(&core), vec![(0, 1600)]);
    }

    #[test]
    fn test_threshold_one_terminates_on_eviction() {
        let mut core = core();
        let mut window = SlidingWindow::new(10, Multiplicity::new(1));
        window.process_hit(&mut core, hit_ns(0)).unwrap();
        window.process_hit(&mut core, hit_ns(5)).unwrap();
        window.process_hit(&mut core, hit_ns(100)).unwrap();
        window.process_hit(&mut core, hit_ns(200)).unwrap();
        window.flush(&mut core).unwrap();
        assert_eq!(spans(&core), vec![(0, 50), (1000, 1000), (2000, 2000)]);
    }

    #[test]
    fn test_out_of_order_is_fatal() {
        let mut core = core();
        let mut window = SlidingWindow::new(100, Multiplicity::new(2));
        window.process_hit(&mut core, hit_ns(50)).unwrap();
        let err = window.process_hit(&mut core, hit_ns(40)).unwrap_err();
        assert_eq!(
            err,
            AlgorithmError::OutOfOrder {
                algorithm: "window".into(),
                time: DaqTime::from_nanos(40),
                bound: DaqTime::from_nanos(50),
            }
        );
    }

    #[test]
    fn test_watermark_tracks_window_front() {
        let mut core = core();
        let mut window = SlidingWindow::new(100, Multiplicity::new(3));
        window.process_hit(&mut core, hit_ns(10)).unwrap();
        assert_eq!(core.watermark(), DaqTime::from_nanos(10));
        window.process_hit(&mut core, hit_ns(50)).unwrap();
        assert_eq!(core.watermark(), DaqTime::from_nanos(10));
        window.process_hit(&mut core, hit_ns(300)).unwrap();
        assert_eq!(core.watermark(), DaqTime::from_nanos(300));
        window.advance_time(&mut core, DaqTime::from_nanos(500)).unwrap();
        assert_eq!(core.watermark(), DaqTime::from_nanos(500));
        assert_eq!(window.state(), WindowState::Idle);
    }

    #[test]
    fn test_watermark_held_on_trigger() {
        let mut core = core();
        let mut window = SlidingWindow::new(100, Multiplicity::new(2));
        window.process_hit(&mut core, hit_ns(10)).unwrap();
        window.process_hit(&mut core, hit_ns(20)).unwrap();
        window.process_hit(&mut core, hit_ns(90)).unwrap();
        assert_eq!(core.watermark(), DaqTime::from_nanos(10));
    }

    #[test]
    fn test_flush_discards_unmet_window() {
        let mut core = core();
        let mut window = SlidingWindow::new(100, Multiplicity::new(2));
        window.process_hit(&mut core, hit_ns(10)).unwrap();
        window.flush(&mut core).unwrap();
        assert!(core.cache().is_empty());

        let mut window = SlidingWindow::new(0, Multiplicity::new(1));
        window.flush(&mut core).unwrap();
        assert!(core.cache().is_empty());
    }

    #[test]
    fn test_flush_emits_open_trigger() {
        let mut core = core();
        let mut window = SlidingWindow::new(100, Multiplicity::new(2));
        window.process_hit(&mut core, hit_ns(10)).unwrap();
        window.process_hit(&mut core, hit_ns(20)).unwrap();
        window.flush(&mut core).unwrap();
        assert_eq!(spans(&core), vec![(100, 200)]);
        assert_eq!(window.state(), WindowState::Idle);
    }

    #[test]
    fn test_rejected_hit_terminates_trigger() {
        let mut core = core();
        let mut window = SlidingWindow::new(100, Multiplicity::new(2));
        window.process_hit(&mut core, hit_ns(0)).unwrap();
        window.process_hit(&mut core, hit_ns(10)).unwrap();
        window
            .advance_time(&mut core, DaqTime::from_nanos(500))
            .unwrap();
        assert_eq!(spans(&core), vec![(0, 100)]);
        assert_eq!(core.watermark(), DaqTime::from_nanos(500));
    }
}
