//! Spatial cluster trigger.

use super::{
    AlgorithmConfig, AlgorithmCore, AlgorithmError, ConfigError, ParamKind, ParamSpec,
    TriggerAlgorithm,
};
use crate::payload::{HitType, Payload};
use crate::window::{ClusterCondition, HitFilter, SlidingWindow};

/// Fires when `threshold` hits within `timeWindow` are neighbours of one
/// window hit: same string neighbourhood (`stringRadius`) and within
/// `coherenceLength` positions. Requests carry only the clustered hits.
#[derive(Debug)]
pub struct ClusterTrigger {
    core: AlgorithmCore,
    filter: HitFilter,
    window: SlidingWindow<ClusterCondition>,
}

impl ClusterTrigger {
    /// Registered type name.
    pub const TYPE: &'static str = "ClusterTrigger";

    /// Accepted parameters.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::required("threshold", "clustered hits needed", ParamKind::POSITIVE),
        ParamSpec::required("timeWindow", "window length in ns", ParamKind::NON_NEGATIVE),
        ParamSpec::optional(
            "coherenceLength",
            "max position distance",
            "7",
            ParamKind::Integer { min: 0, max: 255 },
        ),
        ParamSpec::optional(
            "stringRadius",
            "max string distance",
            "0",
            ParamKind::Integer {
                min: 0,
                max: u16::MAX as i64,
            },
        ),
        ParamSpec::unset("hitType", "only count hits of this type", ParamKind::HitType),
    ];

    /// Builds the trigger from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid parameters.
    pub fn from_config(config: &AlgorithmConfig, instance: u32) -> Result<Self, ConfigError> {
        config.validate(Self::PARAMS)?;
        let threshold: usize = config.require_parsed("threshold")?;
        let time_window: i64 = config.require_parsed("timeWindow")?;
        let coherence_length: u8 = config.parsed_or("coherenceLength", 7)?;
        let string_radius: u16 = config.parsed_or("stringRadius", 0)?;
        let mut filter = HitFilter::any();
        if let Some(kind) = config.get_parsed::<HitType>("hitType")? {
            filter = filter.with_kind(kind);
        }
        Ok(Self {
            core: AlgorithmCore::new(config, instance),
            filter,
            window: SlidingWindow::new(
                time_window,
                ClusterCondition::new(threshold, coherence_length, string_radius),
            ),
        })
    }
}

impl TriggerAlgorithm for ClusterTrigger {
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
