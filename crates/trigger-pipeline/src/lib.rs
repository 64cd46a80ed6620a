//! # Trigger Pipeline
//!
//! Runs the trigger layer on worker threads: input strands feed a splicer
//! worker, the ordered stream fans out to one worker per algorithm, and a
//! collector worker releases finalized requests in global time order.
//!
//! Algorithm state is owned by its worker. The collector reaches it only
//! through messages on the same inbox the splicer feeds, so every answer
//! reflects all input delivered before the question.
//!
//! ## Example
//!
//! ```rust
//! use trigger_core::algorithm::AlgorithmConfig;
//! use trigger_core::payload::{ChannelId, Hit, SourceId, TriggerKey};
//! use trigger_core::time::DaqTime;
//! use trigger_pipeline::{Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::default().with_algorithm(
//!     AlgorithmConfig::new("smt3", "SimpleMajorityTrigger", TriggerKey::new(0, 1, SourceId::IN_ICE_TRIGGER))
//!         .with_param("threshold", 3)
//!         .with_param("timeWindow", 250),
//! );
//! let mut pipeline = Pipeline::start(config)?;
//! let output = pipeline.take_output().unwrap();
//! let reader = std::thread::spawn(move || output.collect::<Vec<_>>());
//!
//! let mut input = pipeline.add_input()?;
//! for ns in [0, 100, 200, 300] {
//!     input.push_hit(Hit::spe(DaqTime::from_nanos(ns), ChannelId::new(1, 1)))?;
//! }
//! input.close()?;
//!
//! let report = pipeline.finish()?;
//! let released = reader.join().unwrap();
//! assert_eq!(released.len(), 1);
//! assert_eq!(report.collector.released, 1);
//! # Ok::<(), trigger_pipeline::PipelineError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod collect;
mod config;
mod error;
mod io;
mod pipeline;
mod splice;
mod worker;

pub use config::{PipelineConfig, DEFAULT_SPLICE_TIMEOUT_MS, DEFAULT_STRAND_BUFFER};
pub use error::PipelineError;
pub use io::{InputHandle, RequestWriter};
pub use pipeline::{Pipeline, RunReport};
pub use worker::{AlgorithmHandle, AlgorithmMessage, AlgorithmWorker};

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
