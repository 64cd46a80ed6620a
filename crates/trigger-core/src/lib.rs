//! # Trigger Core
//!
//! The trigger decision layer of a detector data-acquisition pipeline.
//!
//! This crate provides:
//! - **Splicer**: N-way time-ordered merge of independently produced strands
//! - **Window engine**: the sliding-window state machine hit triggers share
//! - **Algorithms**: multiplicity, cluster, calibration, min-bias, fixed-rate
//!   and the request-combining coincidence, pass-through and veto triggers
//! - **Collector**: watermark/interval negotiation and ordered release of
//!   cached trigger requests
//!
//! The crate starts no threads. `trigger-pipeline` runs the pieces on
//! worker threads connected by the bounded channels in [`streaming`].
//!
//! ## Example
//!
//! ```rust
//! use trigger_core::algorithm::{AlgorithmConfig, AlgorithmRegistry, TriggerAlgorithm};
//! use trigger_core::payload::{ChannelId, Hit, Payload, SourceId, TriggerKey};
//! use trigger_core::time::{DaqTime, Flushable, Interval};
//!
//! let registry = AlgorithmRegistry::with_builtins();
//! let config = AlgorithmConfig::new(
//!     "smt3",
//!     "SimpleMajorityTrigger",
//!     TriggerKey::new(0, 1, SourceId::IN_ICE_TRIGGER),
//! )
//! .with_param("threshold", 3)
//! .with_param("timeWindow", 250);
//! let mut smt = registry.create(&config)?;
//!
//! for ns in [0, 100, 200, 300] {
//!     smt.process(Hit::spe(DaqTime::from_nanos(ns), ChannelId::new(1, 1)).into())?;
//! }
//! smt.process(Payload::flush_sentinel())?;
//!
//! let released = smt.release(Interval::new(DaqTime::ZERO, DaqTime::MAX));
//! assert_eq!(released.len(), 1);
//! assert_eq!(released[0].last_time(), DaqTime::from_nanos(200));
//! # Ok::<(), trigger_core::Error>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod algorithm;
pub mod alloc;
pub mod coincidence;
pub mod collector;
pub mod payload;
pub mod splicer;
pub mod streaming;
pub mod time;
pub mod window;

// Re-export key types
pub use algorithm::{AlgorithmConfig, AlgorithmRegistry, TriggerAlgorithm};
pub use collector::{Collector, CollectorConfig, Participant};
pub use payload::{Hit, Payload, TriggerRequest};
pub use splicer::{Splicer, StrandTail};
pub use time::{DaqTime, Interval};

/// Result type for trigger-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for trigger-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Algorithm configuration errors
    #[error("Config error: {0}")]
    Config(#[from] algorithm::ConfigError),

    /// Errors raised while an algorithm processes its stream
    #[error("Algorithm error: {0}")]
    Algorithm(#[from] algorithm::AlgorithmError),

    /// Strand and merge errors
    #[error("Splicer error: {0}")]
    Splicer(#[from] splicer::SplicerError),

    /// Interval negotiation and release errors
    #[error("Collector error: {0}")]
    Collector(#[from] collector::CollectorError),

    /// Payload construction and codec errors
    #[error("Payload error: {0}")]
    Payload(#[from] payload::PayloadError),

    /// Channel errors
    #[error("Streaming error: {0}")]
    Streaming(#[from] streaming::StreamingError),
}
