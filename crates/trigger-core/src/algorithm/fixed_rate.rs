//! Fixed-rate trigger.

use super::{
    AlgorithmConfig, AlgorithmCore, AlgorithmError, ConfigError, ParamKind, ParamSpec,
    TriggerAlgorithm,
};
use crate::payload::Payload;
use crate::time::{DaqTime, Timed};
use crate::window::FixedRateClock;

/// Emits a zero-width request every `interval` ns of stream time.
///
/// Payload content is ignored; arrivals only sample the clock. The first
/// payload arms it, so the first request falls one interval later.
#[derive(Debug)]
pub struct FixedRateTrigger {
    core: AlgorithmCore,
    clock: FixedRateClock,
    leading_edge: Option<DaqTime>,
}

impl FixedRateTrigger {
    /// Registered type name.
    pub const TYPE: &'static str = "FixedRateTrigger";

    /// Accepted parameters.
    pub const PARAMS: &'static [ParamSpec] = &[ParamSpec::required(
        "interval",
        "period between requests in ns",
        ParamKind::POSITIVE,
    )];

    /// Builds the trigger from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid parameters.
    pub fn from_config(config: &AlgorithmConfig, instance: u32) -> Result<Self, ConfigError> {
        config.validate(Self::PARAMS)?;
        let interval: i64 = config.require_parsed("interval")?;
        Ok(Self {
            core: AlgorithmCore::new(config, instance),
            clock: FixedRateClock::new(interval),
            leading_edge: None,
        })
    }
}

impl TriggerAlgorithm for FixedRateTrigger {
    fn core(&self) -> &AlgorithmCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AlgorithmCore {
        &mut self.core
    }

    fn on_payload(&mut self, payload: Payload) -> Result<(), AlgorithmError> {
        let now = payload.time();
        if let Some(edge) = self.leading_edge {
            if now < edge {
                return Err(self.core.out_of_order(now, edge));
            }
        }
        self.leading_edge = Some(now);

        for tick in self.clock.sample(now) {
            self.core.emit(tick, tick, Vec::new())?;
        }
        if let Some(next) = self.clock.next_tick() {
            self.core.advance_watermark(next);
        }
        Ok(())
    }

    fn on_flush(&mut self) -> Result<(), AlgorithmError> {
        Ok(())
    }

    fn reset_state(&mut self) {
        self.clock.reset();
        self.leading_edge = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{ChannelId, Hit, SourceId, TriggerKey, TriggerRequest};
    use crate::time::{Flushable, Interval};

    fn trigger() -> FixedRateTrigger {
        let config = AlgorithmConfig::new(
            "fixed",
            FixedRateTrigger::TYPE,
            TriggerKey::new(23, 0, SourceId::IN_ICE_TRIGGER),
        )
        .with_param("interval", 1000);
        FixedRateTrigger::from_config(&config, 0).unwrap()
    }

    fn hit(ticks: i64) -> Payload {
        Hit::spe(DaqTime::new(ticks), ChannelId::new(1, 1)).into()
    }

    #[test]
    fn test_ticks_sampled_by_arrivals() {
        let mut t = trigger();
        t.process(hit(500)).unwrap();
        assert_eq!(t.watermark(), DaqTime::new(10_500));
        t.process(hit(9_000)).unwrap();
        assert_eq!(t.stats().emitted, 0);
        t.process(hit(31_000)).unwrap();
        t.process(Payload::flush_sentinel()).unwrap();
        let firsts: Vec<_> = t
            .release(Interval::new(DaqTime::ZERO, DaqTime::MAX))
            .iter()
            .map(TriggerRequest::first_time)
            .collect();
        assert_eq!(
            firsts,
            vec![DaqTime::new(10_500), DaqTime::new(20_500), DaqTime::new(30_500)]
        );
    }

    #[test]
    fn test_accepts_requests() {
        let mut t = trigger();
        let request = TriggerRequest::builder(0, TriggerKey::new(0, 0, SourceId::IN_ICE_TRIGGER))
            .span(DaqTime::new(0), DaqTime::new(5))
            .build()
            .unwrap();
        assert!(t.process(request.into()).is_ok());
    }
}
