//! Calibration trigger: fires on hits of one type, flasher hits by default.

use super::{
    AlgorithmConfig, AlgorithmCore, AlgorithmError, ConfigError, ParamKind, ParamSpec,
    TriggerAlgorithm,
};
use crate::payload::{HitType, Payload};
use crate::window::{HitFilter, Multiplicity, SlidingWindow};

/// Multiplicity trigger over hits of a single calibration type.
#[derive(Debug)]
pub struct CalibrationTrigger {
    core: AlgorithmCore,
    filter: HitFilter,
    window: SlidingWindow<Multiplicity>,
}

impl CalibrationTrigger {
    /// Registered type name.
    pub const TYPE: &'static str = "CalibrationTrigger";

    /// Accepted parameters.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::optional("hitType", "calibration hit type", "FLASHER", ParamKind::HitType),
        ParamSpec::optional("threshold", "hits needed", "1", ParamKind::POSITIVE),
        ParamSpec::optional("timeWindow", "window length in ns", "0", ParamKind::NON_NEGATIVE),
    ];

    /// Builds the trigger from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid parameters.
    pub fn from_config(config: &AlgorithmConfig, instance: u32) -> Result<Self, ConfigError> {
        config.validate(Self::PARAMS)?;
        let kind = config.parsed_or("hitType", HitType::Flasher)?;
        let threshold: usize = config.parsed_or("threshold", 1)?;
        let time_window: i64 = config.parsed_or("timeWindow", 0)?;
        Ok(Self {
            core: AlgorithmCore::new(config, instance),
            filter: HitFilter::any().with_kind(kind),
            window: SlidingWindow::new(time_window, Multiplicity::new(threshold)),
        })
    }
}

impl TriggerAlgorithm for CalibrationTrigger {
    fn core(&self) -> &AlgorithmCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AlgorithmCore {
        &mut self.core
    }

    fn on_payload(&mut self, payload: Payload) -> Result<(), AlgorithmError> {
        match payload {
            Payload::Hit(hit) => self.window.offer(&mut self.core, &self.filter, hit),
            other => Err(self.core.unsupported(other.kind_name())),
        }
    }

    fn on_flush(&mut self) -> Result<(), AlgorithmError> {
        self.window.flush(&mut self.core)
    }

    fn reset_state(&mut self) {
        self.window.reset();
    }
}
