//! Multiplicity trigger: `threshold` accepted hits within `timeWindow`.

use super::{
    AlgorithmConfig, AlgorithmCore, AlgorithmError, ConfigError, ParamKind, ParamSpec,
    TriggerAlgorithm,
};
use crate::payload::{ChannelId, HitType, Payload};
use crate::window::{HitFilter, Multiplicity, SlidingWindow};

/// Fires when at least `threshold` accepted hits fall within `timeWindow`.
///
/// Hits can be restricted to one hit type (`hitType`) and to a channel list
/// (`channels`, `string-position` pairs).
#[derive(Debug)]
pub struct SimpleMajorityTrigger {
    core: AlgorithmCore,
    filter: HitFilter,
    window: SlidingWindow<Multiplicity>,
}

impl SimpleMajorityTrigger {
    /// Registered type name.
    pub const TYPE: &'static str = "SimpleMajorityTrigger";

    /// Accepted parameters.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::required("threshold", "accepted hits needed", ParamKind::POSITIVE),
        ParamSpec::required("timeWindow", "window length in ns", ParamKind::NON_NEGATIVE),
        ParamSpec::unset("hitType", "only count hits of this type", ParamKind::HitType),
        ParamSpec::unset("channels", "only count these channels", ParamKind::Channels),
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
        let mut filter = HitFilter::any().with_channels(config.get_list::<ChannelId>("channels")?);
        if let Some(kind) = config.get_parsed::<HitType>("hitType")? {
            filter = filter.with_kind(kind);
        }
        Ok(Self {
            core: AlgorithmCore::new(config, instance),
            filter,
            window: SlidingWindow::new(time_window, Multiplicity::new(threshold)),
        })
    }

    /// The sliding window.
    #[must_use]
    pub fn window(&self) -> &SlidingWindow<Multiplicity> {
        &self.window
    }
}

impl TriggerAlgorithm for SimpleMajorityTrigger {
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
