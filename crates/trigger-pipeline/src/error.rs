//! Error types for the pipeline runtime.

use trigger_core::algorithm::{AlgorithmError, ConfigError};
use trigger_core::collector::CollectorError;
use trigger_core::payload::PayloadError;
use trigger_core::splicer::SplicerError;
use trigger_core::streaming::StreamingError;

/// Errors from pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Core engine error
    #[error("Engine error: {0}")]
    Engine(#[from] trigger_core::Error),

    /// Algorithm configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Algorithm processing error
    #[error("Algorithm error: {0}")]
    Algorithm(#[from] AlgorithmError),

    /// Interval negotiation or release error
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Strand or merge error
    #[error("Splicer error: {0}")]
    Splicer(#[from] SplicerError),

    /// Payload decoding error
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    /// Channel error
    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),

    /// Pipeline configuration is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a configuration file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker thread could not be started
    #[error("Failed to spawn worker '{worker}': {message}")]
    SpawnFailed {
        /// Worker name
        worker: String,
        /// OS error text
        message: String,
    },

    /// A worker thread panicked
    #[error("Worker '{0}' panicked")]
    WorkerPanicked(String),

    /// Run reset requested while inputs are still open
    #[error("Run still in progress; close every input before resetting")]
    RunInProgress,

    /// The pipeline has shut down
    #[error("Pipeline is shut down")]
    Shutdown,
}
