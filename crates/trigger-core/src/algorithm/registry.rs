//! Algorithm registry with factory pattern.
//!
//! The [`AlgorithmRegistry`] maps algorithm type names to factories and
//! hands out instance ordinals from an injected [`InstanceIdGenerator`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{
    AlgorithmConfig, CalibrationTrigger, ClusterTrigger, CoincidenceTrigger, ConfigError,
    FixedRateTrigger, InstanceIdGenerator, MinBiasTrigger, ParamSpec, PassThroughTrigger,
    SimpleMajorityTrigger, TriggerAlgorithm, VetoTrigger,
};

/// Factory creating an algorithm from its configuration and instance ordinal.
pub type AlgorithmFactory = Arc<
    dyn Fn(&AlgorithmConfig, u32) -> Result<Box<dyn TriggerAlgorithm>, ConfigError> + Send + Sync,
>;

/// Metadata about a registered algorithm type.
#[derive(Debug, Clone)]
pub struct AlgorithmInfo {
    /// Type name used in configurations.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Parameters the algorithm accepts.
    pub params: Vec<ParamSpec>,
}

impl AlgorithmInfo {
    /// Creates algorithm metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, params: &[ParamSpec]) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: params.to_vec(),
        }
    }
}

/// Registry of available algorithm types.
///
/// # Example
///
/// ```rust
/// use trigger_core::algorithm::{AlgorithmConfig, AlgorithmRegistry, TriggerAlgorithm};
/// use trigger_core::payload::{SourceId, TriggerKey};
///
/// let registry = AlgorithmRegistry::with_builtins();
/// let config = AlgorithmConfig::new(
///     "smt8",
///     "SimpleMajorityTrigger",
///     TriggerKey::new(0, 1006, SourceId::IN_ICE_TRIGGER),
/// )
/// .with_param("threshold", 8)
/// .with_param("timeWindow", 5000);
///
/// let algorithm = registry.create(&config).unwrap();
/// assert_eq!(algorithm.name(), "smt8");
/// ```
#[derive(Clone)]
pub struct AlgorithmRegistry {
    factories: Arc<RwLock<HashMap<String, (AlgorithmInfo, AlgorithmFactory)>>>,
    instances: InstanceIdGenerator,
}

impl AlgorithmRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_instance_ids(InstanceIdGenerator::new())
    }

    /// Creates an empty registry drawing ordinals from `instances`.
    #[must_use]
    pub fn with_instance_ids(instances: InstanceIdGenerator) -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
            instances,
        }
    }

    /// Creates a registry holding every built-in algorithm.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// Registers every built-in algorithm.
    pub fn register_builtins(&self) {
        macro_rules! builtin {
            ($ty:ty, $description:expr) => {
                self.register(
                    AlgorithmInfo::new(<$ty>::TYPE, $description, <$ty>::PARAMS),
                    Arc::new(
                        |config: &AlgorithmConfig,
                         instance: u32|
                         -> Result<Box<dyn TriggerAlgorithm>, ConfigError> {
                            Ok(Box::new(<$ty>::from_config(config, instance)?))
                        },
                    ),
                );
            };
        }
        builtin!(SimpleMajorityTrigger, "hit multiplicity within a time window");
        builtin!(CalibrationTrigger, "hits of one calibration type");
        builtin!(ClusterTrigger, "spatially clustered hits within a time window");
        builtin!(MinBiasTrigger, "every n-th accepted hit");
        builtin!(FixedRateTrigger, "fixed-period readout clock");
        builtin!(CoincidenceTrigger, "N-of-M coincidence of trigger requests");
        builtin!(PassThroughTrigger, "every trigger request, wrapped");
        builtin!(VetoTrigger, "every trigger request except vetoed triggers");
    }

    /// Registers an algorithm factory under `info.name`.
    pub fn register(&self, info: AlgorithmInfo, factory: AlgorithmFactory) {
        self.factories
            .write()
            .insert(info.name.clone(), (info, factory));
    }

    /// Creates an algorithm instance.
    ///
    /// The type is taken from `config.algorithm`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAlgorithm`] for an unregistered type, or
    /// the factory's error for invalid parameters.
    pub fn create(&self, config: &AlgorithmConfig) -> Result<Box<dyn TriggerAlgorithm>, ConfigError> {
        let factory = {
            let factories = self.factories.read();
            let (_, factory) = factories
                .get(&config.algorithm)
                .ok_or_else(|| ConfigError::UnknownAlgorithm(config.algorithm.clone()))?;
            Arc::clone(factory)
        };
        let instance = self.instances.next_id();
        let algorithm = factory(config, instance)?;
        debug!(
            algorithm = %config.name,
            kind = %config.algorithm,
            instance,
            key = %config.key(),
            "created trigger algorithm"
        );
        Ok(algorithm)
    }

    /// Returns information about a registered algorithm type.
    #[must_use]
    pub fn info(&self, name: &str) -> Option<AlgorithmInfo> {
        self.factories.read().get(name).map(|(info, _)| info.clone())
    }

    /// Lists registered type names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("algorithms", &self.list())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{SourceId, TriggerKey};

    #[test]
    fn test_builtins_registered() {
        let registry = AlgorithmRegistry::with_builtins();
        let names = registry.list();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"VetoTrigger".to_string()));
        let info = registry.info("SimpleMajorityTrigger").unwrap();
        assert!(info.params.iter().any(|p| p.name == "threshold" && p.required));
    }

    #[test]
    fn test_create_assigns_instance_ordinals() {
        let ids = InstanceIdGenerator::new();
        let registry = AlgorithmRegistry::with_instance_ids(ids.clone());
        registry.register_builtins();
        let config = AlgorithmConfig::new(
            "mb",
            "MinBiasTrigger",
            TriggerKey::new(2, 0, SourceId::IN_ICE_TRIGGER),
        )
        .with_param("prescale", 100);
        let a = registry.create(&config).unwrap();
        let b = registry.create(&config).unwrap();
        assert_eq!(a.stats().instance, 0);
        assert_eq!(b.stats().instance, 1);
        assert_eq!(ids.next_id(), 2);
    }

    #[test]
    fn test_unknown_algorithm() {
        let registry = AlgorithmRegistry::with_builtins();
        let config = AlgorithmConfig::new("x", "NoSuchTrigger", TriggerKey::new(0, 0, SourceId::ANY));
        assert!(matches!(
            registry.create(&config),
            Err(ConfigError::UnknownAlgorithm(name)) if name == "NoSuchTrigger"
        ));
    }

    #[test]
    fn test_factory_error_propagates() {
        let registry = AlgorithmRegistry::with_builtins();
        let config = AlgorithmConfig::new(
            "smt",
            "SimpleMajorityTrigger",
            TriggerKey::new(0, 0, SourceId::IN_ICE_TRIGGER),
        )
        .with_param("threshold", 3)
        .with_param("timeWindow", 100)
        .with_param("bogus", 1);
        assert!(matches!(
            registry.create(&config),
            Err(ConfigError::UnknownParam { .. })
        ));
    }
}
