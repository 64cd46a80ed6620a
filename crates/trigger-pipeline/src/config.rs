//! Configuration for a trigger pipeline.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use trigger_core::algorithm::{AlgorithmConfig, ConfigError};
use trigger_core::collector::CollectorConfig;
use trigger_core::streaming::{BackpressureStrategy, ChannelConfig};

use crate::PipelineError;

/// Default wait of the splicer worker for a stalled strand, in milliseconds.
pub const DEFAULT_SPLICE_TIMEOUT_MS: u64 = 50;

/// Default depth of each input strand queue.
pub const DEFAULT_STRAND_BUFFER: usize = 4096;

/// Configuration for a [`Pipeline`](crate::Pipeline).
///
/// ```rust
/// use trigger_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::from_json(r#"{
///     "algorithms": [{
///         "name": "smt8",
///         "type": "SimpleMajorityTrigger",
///         "trigger_type": 0,
///         "config_id": 1006,
///         "source": 4000,
///         "params": { "threshold": "8", "timeWindow": "5000" }
///     }],
///     "collector": { "merge_overlapping": true }
/// }"#).unwrap();
/// assert_eq!(config.algorithms.len(), 1);
/// assert!(config.collector.merge_overlapping);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Algorithm instances, each run on its own worker.
    pub algorithms: Vec<AlgorithmConfig>,
    /// Release collector settings.
    pub collector: CollectorConfig,
    /// Queue behind each input strand.
    pub strand_channel: ChannelConfig,
    /// Inbox of each algorithm worker.
    pub algorithm_queue: ChannelConfig,
    /// Queue of released requests handed to the consumer.
    pub output_channel: ChannelConfig,
    /// How long the splicer worker waits on a stalled strand before
    /// rechecking for shutdown, in milliseconds.
    pub splice_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            algorithms: Vec::new(),
            collector: CollectorConfig::default(),
            strand_channel: ChannelConfig::with_buffer_size(DEFAULT_STRAND_BUFFER),
            algorithm_queue: ChannelConfig::default(),
            output_channel: ChannelConfig::default(),
            splice_timeout_ms: DEFAULT_SPLICE_TIMEOUT_MS,
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Json`] for malformed input.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be read, or
    /// [`PipelineError::Json`] for malformed content.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Adds an algorithm instance.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: AlgorithmConfig) -> Self {
        self.algorithms.push(algorithm);
        self
    }

    /// Replaces the collector settings.
    #[must_use]
    pub fn with_collector(mut self, collector: CollectorConfig) -> Self {
        self.collector = collector;
        self
    }

    /// Sets the algorithm inbox configuration.
    #[must_use]
    pub fn with_algorithm_queue(mut self, queue: ChannelConfig) -> Self {
        self.algorithm_queue = queue;
        self
    }

    /// Sets the output queue configuration.
    #[must_use]
    pub fn with_output_channel(mut self, channel: ChannelConfig) -> Self {
        self.output_channel = channel;
        self
    }

    /// Sets the strand queue configuration.
    #[must_use]
    pub fn with_strand_channel(mut self, channel: ChannelConfig) -> Self {
        self.strand_channel = channel;
        self
    }

    /// Splicer worker wait as a [`Duration`].
    #[must_use]
    pub fn splice_timeout(&self) -> Duration {
        Duration::from_millis(self.splice_timeout_ms.max(1))
    }

    /// Checks what can be checked before any algorithm is built.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no algorithm is configured, an
    /// instance name repeats, or the collector's final source names no
    /// configured instance.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.algorithms.is_empty() {
            return Err(ConfigError::Invalid("no algorithms configured".into()));
        }
        let mut names = HashSet::with_capacity(self.algorithms.len());
        for algorithm in &self.algorithms {
            if !names.insert(algorithm.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate algorithm name '{}'",
                    algorithm.name
                )));
            }
        }
        if let Some(final_source) = &self.collector.final_source {
            if !names.contains(final_source.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "final source '{final_source}' is not a configured algorithm"
                )));
            }
        }
        // Every algorithm must see the whole merged stream and every command.
        for (queue, channel) in [
            ("strand_channel", &self.strand_channel),
            ("algorithm_queue", &self.algorithm_queue),
        ] {
            if channel.backpressure != BackpressureStrategy::Block {
                return Err(ConfigError::Invalid(format!(
                    "{queue} must block when full, not {:?}",
                    channel.backpressure
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trigger_core::payload::{SourceId, TriggerKey};

    fn smt(name: &str) -> AlgorithmConfig {
        AlgorithmConfig::new(
            name,
            "SimpleMajorityTrigger",
            TriggerKey::new(0, 1006, SourceId::IN_ICE_TRIGGER),
        )
        .with_param("threshold", 8)
        .with_param("timeWindow", 5000)
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.splice_timeout(), Duration::from_millis(50));
        assert_eq!(config.strand_channel.buffer_size, DEFAULT_STRAND_BUFFER);
        assert!(!config.collector.merge_overlapping);
    }

    #[test]
    fn test_from_json_partial() {
        let config = PipelineConfig::from_json(
            r#"{
                "algorithms": [{
                    "name": "mb",
                    "type": "MinBiasTrigger",
                    "trigger_type": 2,
                    "config_id": 0,
                    "source": 4000,
                    "params": { "prescale": "100" }
                }],
                "output_channel": { "buffer_size": 16, "backpressure": "drop_oldest" },
                "splice_timeout_ms": 5
            }"#,
        )
        .unwrap();
        assert_eq!(config.algorithms[0].get("prescale"), Some("100"));
        assert_eq!(config.output_channel.buffer_size, 16);
        assert_eq!(config.splice_timeout(), Duration::from_millis(5));
        assert_eq!(config.collector, CollectorConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            PipelineConfig::from_json("{ \"algorithms\": 3 }"),
            Err(PipelineError::Json(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_and_duplicates() {
        assert!(PipelineConfig::default().validate().is_err());

        let config = PipelineConfig::default()
            .with_algorithm(smt("a"))
            .with_algorithm(smt("a"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_final_source() {
        let config = PipelineConfig::default()
            .with_algorithm(smt("a"))
            .with_collector(CollectorConfig::default().with_final_source("b"));
        assert!(config.validate().is_err());

        let config = PipelineConfig::default()
            .with_algorithm(smt("b"))
            .with_collector(CollectorConfig::default().with_final_source("b"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_lossy_queues() {
        for strategy in [BackpressureStrategy::DropOldest, BackpressureStrategy::Reject] {
            let lossy = ChannelConfig::default().backpressure(strategy);
            let config = PipelineConfig::default()
                .with_algorithm(smt("a"))
                .with_algorithm_queue(lossy.clone());
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid(m)) if m.contains("algorithm_queue")
            ));

            let config = PipelineConfig::default()
                .with_algorithm(smt("a"))
                .with_strand_channel(lossy.clone());
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid(m)) if m.contains("strand_channel")
            ));

            let config = PipelineConfig::default()
                .with_algorithm(smt("a"))
                .with_output_channel(lossy);
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let config = PipelineConfig::default().with_algorithm(smt("smt8"));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(PipelineConfig::from_json(&json).unwrap(), config);
    }
}
