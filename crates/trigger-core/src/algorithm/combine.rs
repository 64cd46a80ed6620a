//! Algorithms combining requests from other triggers.

use fxhash::FxHashSet;

use super::{
    AlgorithmConfig, AlgorithmCore, AlgorithmError, ConfigError, ParamKind, ParamSpec,
    TriggerAlgorithm,
};
use crate::coincidence::{CoincidenceEngine, CoincidenceMode};
use crate::payload::{Payload, TriggerKey};

fn key_set(config: &AlgorithmConfig, param: &str) -> Result<FxHashSet<TriggerKey>, ConfigError> {
    Ok(config.get_list::<TriggerKey>(param)?.into_iter().collect())
}

macro_rules! combine_trigger {
    ($ty:ident) => {
        impl TriggerAlgorithm for $ty {
            fn core(&self) -> &AlgorithmCore {
                &self.core
            }

            fn core_mut(&mut self) -> &mut AlgorithmCore {
                &mut self.core
            }

            fn on_payload(&mut self, payload: Payload) -> Result<(), AlgorithmError> {
                match payload {
                    Payload::Request(request) => {
                        self.engine.process_request(&mut self.core, request)
                    }
                    other => Err(self.core.unsupported(other.kind_name())),
                }
            }

            fn on_flush(&mut self) -> Result<(), AlgorithmError> {
                self.engine.flush(&mut self.core)
            }

            fn reset_state(&mut self) {
                self.engine.reset();
            }
        }

        impl $ty {
            /// The pending-bag engine.
            #[must_use]
            pub fn engine(&self) -> &CoincidenceEngine {
                &self.engine
            }
        }
    };
}

/// N-of-M coincidence between configured triggers.
///
/// `triggers` lists the participating triggers as `type:config:source`;
/// `coincidence` (default 2) distinct ones must overlap within `timeGate`.
#[derive(Debug)]
pub struct CoincidenceTrigger {
    core: AlgorithmCore,
    engine: CoincidenceEngine,
}

impl CoincidenceTrigger {
    /// Registered type name.
    pub const TYPE: &'static str = "CoincidenceTrigger";

    /// Accepted parameters.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::required("timeGate", "hold time past a request's end in ns", ParamKind::NON_NEGATIVE),
        ParamSpec::optional("coincidence", "distinct triggers needed", "2", ParamKind::POSITIVE),
        ParamSpec::required("triggers", "participating triggers", ParamKind::TriggerKeys),
    ];

    /// Builds the trigger from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid parameters, including a
    /// `coincidence` larger than the number of configured triggers.
    pub fn from_config(config: &AlgorithmConfig, instance: u32) -> Result<Self, ConfigError> {
        config.validate(Self::PARAMS)?;
        let gate: i64 = config.require_parsed("timeGate")?;
        let required: usize = config.parsed_or("coincidence", 2)?;
        let triggers = key_set(config, "triggers")?;
        if required > triggers.len() {
            return Err(config.invalid(
                "coincidence",
                format!("only {} distinct triggers configured", triggers.len()),
            ));
        }
        Ok(Self {
            core: AlgorithmCore::new(config, instance),
            engine: CoincidenceEngine::new(gate, CoincidenceMode::NofM { required, triggers }),
        })
    }
}

combine_trigger!(CoincidenceTrigger);

/// Wraps every input request individually, optionally only from `triggers`.
#[derive(Debug)]
pub struct PassThroughTrigger {
    core: AlgorithmCore,
    engine: CoincidenceEngine,
}

impl PassThroughTrigger {
    /// Registered type name.
    pub const TYPE: &'static str = "PassThroughTrigger";

    /// Accepted parameters.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::optional("timeGate", "hold time past a request's end in ns", "0", ParamKind::NON_NEGATIVE),
        ParamSpec::unset("triggers", "only pass these triggers", ParamKind::TriggerKeys),
    ];

    /// Builds the trigger from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid parameters.
    pub fn from_config(config: &AlgorithmConfig, instance: u32) -> Result<Self, ConfigError> {
        config.validate(Self::PARAMS)?;
        let gate: i64 = config.parsed_or("timeGate", 0)?;
        let filter = key_set(config, "triggers")?;
        let filter = (!filter.is_empty()).then_some(filter);
        Ok(Self {
            core: AlgorithmCore::new(config, instance),
            engine: CoincidenceEngine::new(gate, CoincidenceMode::PassThrough { filter }),
        })
    }
}

combine_trigger!(PassThroughTrigger);

/// Passes every request except those from the `veto` triggers.
#[derive(Debug)]
pub struct VetoTrigger {
    core: AlgorithmCore,
    engine: CoincidenceEngine,
}

impl VetoTrigger {
    /// Registered type name.
    pub const TYPE: &'static str = "VetoTrigger";

    /// Accepted parameters.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::optional("timeGate", "hold time past a request's end in ns", "0", ParamKind::NON_NEGATIVE),
        ParamSpec::required("veto", "triggers to suppress", ParamKind::TriggerKeys),
    ];

    /// Builds the trigger from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid parameters.
    pub fn from_config(config: &AlgorithmConfig, instance: u32) -> Result<Self, ConfigError> {
        config.validate(Self::PARAMS)?;
        let gate: i64 = config.parsed_or("timeGate", 0)?;
        let excluded = key_set(config, "veto")?;
        Ok(Self {
            core: AlgorithmCore::new(config, instance),
            engine: CoincidenceEngine::new(gate, CoincidenceMode::Veto { excluded }),
        })
    }
}

combine_trigger!(VetoTrigger);
