//! Prescaled minimum-bias trigger.

use super::{
    AlgorithmConfig, AlgorithmCore, AlgorithmError, ConfigError, ParamKind, ParamSpec,
    TriggerAlgorithm,
};
use crate::payload::{HitType, Payload};
use crate::time::DaqTime;
use crate::window::{HitFilter, Prescaler};

/// Emits a single-hit request for every `prescale`-th accepted hit.
#[derive(Debug)]
pub struct MinBiasTrigger {
    core: AlgorithmCore,
    filter: HitFilter,
    prescaler: Prescaler,
    leading_edge: Option<DaqTime>,
}

impl MinBiasTrigger {
    /// Registered type name.
    pub const TYPE: &'static str = "MinBiasTrigger";

    /// Accepted parameters.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::required("prescale", "accepted hits per request", ParamKind::POSITIVE),
        ParamSpec::unset("hitType", "only count hits of this type", ParamKind::HitType),
    ];

    /// Builds the trigger from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid parameters.
    pub fn from_config(config: &AlgorithmConfig, instance: u32) -> Result<Self, ConfigError> {
        config.validate(Self::PARAMS)?;
        let prescale: u64 = config.require_parsed("prescale")?;
        let mut filter = HitFilter::any();
        if let Some(kind) = config.get_parsed::<HitType>("hitType")? {
            filter = filter.with_kind(kind);
        }
        Ok(Self {
            core: AlgorithmCore::new(config, instance),
            filter,
            prescaler: Prescaler::new(prescale),
            leading_edge: None,
        })
    }
}

impl TriggerAlgorithm for MinBiasTrigger {
    fn core(&self) -> &AlgorithmCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AlgorithmCore {
        &mut self.core
    }

    fn on_payload(&mut self, payload: Payload) -> Result<(), AlgorithmError> {
        let hit = match payload {
            Payload::Hit(hit) => hit,
            other => return Err(self.core.unsupported(other.kind_name())),
        };
        if let Some(edge) = self.leading_edge {
            if hit.time < edge {
                return Err(self.core.out_of_order(hit.time, edge));
            }
        }
        self.leading_edge = Some(hit.time);

        if !self.filter.accepts(&hit) {
            self.core.count_rejected();
        } else if self.prescaler.tick() {
            self.core.emit(hit.time, hit.time, vec![hit])?;
        }
        self.core.advance_watermark(hit.time);
        Ok(())
    }

    fn on_flush(&mut self) -> Result<(), AlgorithmError> {
        Ok(())
    }

    fn reset_state(&mut self) {
        self.prescaler.reset();
        self.leading_edge = None;
    }
}
