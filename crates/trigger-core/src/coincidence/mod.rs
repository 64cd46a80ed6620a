//! # Coincidence Module
//!
//! Combines trigger requests from configured sub-triggers.
//!
//! Each admitted request waits in a pending bag until stream time (the
//! first time of the latest input) moves more than the time gate past its
//! last time. It is then resolved:
//!
//! - **N-of-M**: the pending requests overlapping it are gathered. If they
//!   come from at least `N` distinct triggers they are wrapped into one
//!   request and removed; otherwise the expired request alone is dropped.
//! - **Pass-through**: the expired request is wrapped on its own.
//! - **Veto**: pass-through, except requests from the exclusion set are
//!   never admitted.
//!
//! The published watermark is the earliest pending first time, or stream
//! time when nothing is pending.

use fxhash::FxHashSet;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::algorithm::{AlgorithmCore, AlgorithmError};
use crate::payload::{TriggerKey, TriggerRequest};
use crate::time::{nanos_to_ticks, DaqTime};

/// How expired requests are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoincidenceMode {
    /// Wrap groups from at least `required` distinct configured triggers.
    NofM {
        /// Distinct triggers needed.
        required: usize,
        /// Triggers taking part; others are not admitted.
        triggers: FxHashSet<TriggerKey>,
    },
    /// Wrap every admitted request individually.
    PassThrough {
        /// When set, only these triggers are admitted.
        filter: Option<FxHashSet<TriggerKey>>,
    },
    /// Wrap every request not from an excluded trigger.
    Veto {
        /// Triggers to suppress.
        excluded: FxHashSet<TriggerKey>,
    },
}

/// Breakdown of the requests the engine discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoincidenceCounters {
    /// Wrapped requests formed.
    pub formed: u64,
    /// Expired requests with no coincidence.
    pub expired: u64,
    /// Requests from triggers outside the configured set.
    pub filtered: u64,
    /// Requests suppressed by the veto set.
    pub vetoed: u64,
}

/// Pending-bag coincidence engine.
#[derive(Debug)]
pub struct CoincidenceEngine {
    gate: i64,
    mode: CoincidenceMode,
    pending: Vec<TriggerRequest>,
    stream_time: Option<DaqTime>,
    counters: CoincidenceCounters,
}

impl CoincidenceEngine {
    /// Creates an engine with a time gate in ns.
    #[must_use]
    pub fn new(time_gate_ns: i64, mode: CoincidenceMode) -> Self {
        Self {
            gate: nanos_to_ticks(time_gate_ns),
            mode,
            pending: Vec::new(),
            stream_time: None,
            counters: CoincidenceCounters::default(),
        }
    }

    /// The resolution mode.
    #[must_use]
    pub fn mode(&self) -> &CoincidenceMode {
        &self.mode
    }

    /// Requests waiting in the bag.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard counters.
    #[must_use]
    pub fn counters(&self) -> CoincidenceCounters {
        self.counters
    }

    /// Admits one input request.
    ///
    /// # Errors
    ///
    /// Returns [`AlgorithmError::OutOfOrder`] if the request starts before
    /// the current stream time, or any error raised while emitting.
    pub fn process_request(
        &mut self,
        core: &mut AlgorithmCore,
        request: TriggerRequest,
    ) -> Result<(), AlgorithmError> {
        let now = request.first_time();
        if let Some(stream_time) = self.stream_time {
            if now < stream_time {
                return Err(core.out_of_order(now, stream_time));
            }
        }
        self.stream_time = Some(now);
        self.resolve_expired(core, now)?;

        if self.admits(core, &request) {
            self.pending.push(request);
        }
        self.publish_watermark(core, now);
        Ok(())
    }

    /// Resolves every pending request.
    ///
    /// # Errors
    ///
    /// Returns any error raised while emitting.
    pub fn flush(&mut self, core: &mut AlgorithmCore) -> Result<(), AlgorithmError> {
        while !self.pending.is_empty() {
            self.resolve(core, 0)?;
        }
        Ok(())
    }

    /// Drops all state for a new run. Counters survive.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.stream_time = None;
    }

    fn admits(&mut self, core: &mut AlgorithmCore, request: &TriggerRequest) -> bool {
        let key = request.key();
        let admitted = match &self.mode {
            CoincidenceMode::NofM { triggers, .. } => triggers.contains(&key),
            CoincidenceMode::PassThrough { filter } => {
                filter.as_ref().map_or(true, |f| f.contains(&key))
            }
            CoincidenceMode::Veto { excluded } => {
                if excluded.contains(&key) {
                    self.counters.vetoed += 1;
                    core.count_dropped(1);
                    trace!(algorithm = core.name(), uid = request.uid(), %key, "vetoed");
                    return false;
                }
                true
            }
        };
        if !admitted {
            self.counters.filtered += 1;
            core.count_dropped(1);
            trace!(algorithm = core.name(), uid = request.uid(), %key, "not a configured trigger");
        }
        admitted
    }

    fn resolve_expired(&mut self, core: &mut AlgorithmCore, now: DaqTime) -> Result<(), AlgorithmError> {
        let gate = self.gate;
        while let Some(idx) = self
            .pending
            .iter()
            .position(|p| now > p.last_time().saturating_add(gate))
        {
            self.resolve(core, idx)?;
        }
        Ok(())
    }

    fn resolve(&mut self, core: &mut AlgorithmCore, idx: usize) -> Result<(), AlgorithmError> {
        let required = match &self.mode {
            CoincidenceMode::NofM { required, .. } => *required,
            CoincidenceMode::PassThrough { .. } | CoincidenceMode::Veto { .. } => {
                let request = self.pending.remove(idx);
                self.counters.formed += 1;
                return core.emit_wrapped(vec![request]);
            }
        };

        let anchor = &self.pending[idx];
        let group: SmallVec<[usize; 8]> = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.overlaps(anchor))
            .map(|(i, _)| i)
            .collect();
        let mut keys: SmallVec<[TriggerKey; 8]> =
            group.iter().map(|&i| self.pending[i].key()).collect();
        keys.sort_unstable();
        keys.dedup();

        if keys.len() >= required {
            let mut components = Vec::with_capacity(group.len());
            for &i in group.iter().rev() {
                components.push(self.pending.remove(i));
            }
            components.reverse();
            debug!(
                algorithm = core.name(),
                components = components.len(),
                triggers = keys.len(),
                "coincidence formed"
            );
            self.counters.formed += 1;
            core.emit_wrapped(components)
        } else {
            let expired = self.pending.remove(idx);
            self.counters.expired += 1;
            core.count_dropped(1);
            trace!(
                algorithm = core.name(),
                uid = expired.uid(),
                key = %expired.key(),
                "no coincidence"
            );
            Ok(())
        }
    }

    fn publish_watermark(&self, core: &mut AlgorithmCore, now: DaqTime) {
        let bound = self
            .pending
            .iter()
            .map(TriggerRequest::first_time)
            .min()
            .unwrap_or(now);
        core.advance_watermark(bound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AlgorithmConfig;
    use crate::payload::SourceId;

    const SMT: TriggerKey = TriggerKey::new(0, 1006, SourceId::IN_ICE_TRIGGER);
    const STRING: TriggerKey = TriggerKey::new(1, 1007, SourceId::IN_ICE_TRIGGER);
    const TOP: TriggerKey = TriggerKey::new(2, 102, SourceId::ICETOP_TRIGGER);

    fn core() -> AlgorithmCore {
        let config = AlgorithmConfig::new(
            "global",
            "CoincidenceTrigger",
            TriggerKey::new(3, 0, SourceId::GLOBAL_TRIGGER),
        );
        AlgorithmCore::new(&config, 0)
    }

    fn req(key: TriggerKey, uid: u32, first: i64, last: i64) -> TriggerRequest {
        TriggerRequest::builder(uid, key)
            .span(DaqTime::new(first), DaqTime::new(last))
            .build()
            .unwrap()
    }

    fn n_of_m(required: usize) -> CoincidenceMode {
        CoincidenceMode::NofM {
            required,
            triggers: [SMT, STRING, TOP].into_iter().collect(),
        }
    }

    #[test]
    fn test_coincidence_wraps_overlapping_group() {
        let mut core = core();
        let mut engine = CoincidenceEngine::new(10, n_of_m(2));
        engine.process_request(&mut core, req(SMT, 0, 100, 200)).unwrap();
        engine.process_request(&mut core, req(TOP, 0, 150, 300)).unwrap();
        assert_eq!(core.watermark(), DaqTime::new(100));
        engine.process_request(&mut core, req(SMT, 1, 1000, 1100)).unwrap();
        assert_eq!(engine.pending_len(), 1);
        let wrapped = core.cache().iter().next().unwrap();
        assert_eq!(wrapped.first_time(), DaqTime::new(100));
        assert_eq!(wrapped.last_time(), DaqTime::new(300));
        assert_eq!(wrapped.components().len(), 2);
        assert_eq!(core.watermark(), DaqTime::new(1000));
    }

    #[test]
    fn test_same_trigger_twice_is_not_a_coincidence() {
        let mut core = core();
        let mut engine = CoincidenceEngine::new(10, n_of_m(2));
        engine.process_request(&mut core, req(SMT, 0, 100, 200)).unwrap();
        engine.process_request(&mut core, req(SMT, 1, 150, 250)).unwrap();
        engine.flush(&mut core).unwrap();
        assert!(core.cache().is_empty());
        assert_eq!(engine.counters().expired, 2);
        assert_eq!(core.stats().dropped, 2);
    }

    #[test]
    fn test_gate_holds_request() {
        let mut core = core();
        let mut engine = CoincidenceEngine::new(100, n_of_m(2));
        engine.process_request(&mut core, req(SMT, 0, 0, 100)).unwrap();
        // 1000 ticks of gate: a request starting at 1100 still joins.
        engine.process_request(&mut core, req(STRING, 0, 1100, 1200)).unwrap();
        assert_eq!(engine.pending_len(), 2);
        engine.flush(&mut core).unwrap();
        // They do not overlap, so both expire alone.
        assert!(core.cache().is_empty());
        assert_eq!(engine.counters().expired, 2);
    }

    #[test]
    fn test_unconfigured_trigger_filtered() {
        let mut core = core();
        let mut engine = CoincidenceEngine::new(0, n_of_m(2));
        let other = TriggerKey::new(9, 9, SourceId::IN_ICE_TRIGGER);
        engine.process_request(&mut core, req(other, 0, 0, 10)).unwrap();
        assert_eq!(engine.pending_len(), 0);
        assert_eq!(engine.counters().filtered, 1);
    }

    #[test]
    fn test_pass_through_wraps_each() {
        let mut core = core();
        let mut engine = CoincidenceEngine::new(0, CoincidenceMode::PassThrough { filter: None });
        engine.process_request(&mut core, req(SMT, 0, 0, 10)).unwrap();
        engine.process_request(&mut core, req(TOP, 0, 5, 20)).unwrap();
        engine.flush(&mut core).unwrap();
        let spans: Vec<_> = core
            .cache()
            .iter()
            .map(|r| (r.first_time().ticks(), r.components().len()))
            .collect();
        assert_eq!(spans, vec![(0, 1), (5, 1)]);
    }

    #[test]
    fn test_veto_suppresses_excluded() {
        let mut core = core();
        let mut engine = CoincidenceEngine::new(
            0,
            CoincidenceMode::Veto {
                excluded: [TOP].into_iter().collect(),
            },
        );
        engine.process_request(&mut core, req(SMT, 0, 0, 10)).unwrap();
        engine.process_request(&mut core, req(TOP, 0, 5, 20)).unwrap();
        engine.flush(&mut core).unwrap();
        assert_eq!(core.cache().len(), 1);
        assert_eq!(engine.counters().vetoed, 1);
    }

    #[test]
    fn test_out_of_order_request_rejected() {
        let mut core = core();
        let mut engine = CoincidenceEngine::new(0, n_of_m(2));
        engine.process_request(&mut core, req(SMT, 0, 100, 110)).unwrap();
        assert!(matches!(
            engine.process_request(&mut core, req(TOP, 0, 50, 60)),
            Err(AlgorithmError::OutOfOrder { .. })
        ));
    }
}
