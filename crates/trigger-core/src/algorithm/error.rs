//! Algorithm and configuration errors.

use crate::payload::PayloadError;
use crate::time::DaqTime;

/// Configuration errors, raised before any data flows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A parameter name the algorithm does not know.
    #[error("{algorithm}: unknown parameter '{param}'")]
    UnknownParam {
        /// Algorithm instance name.
        algorithm: String,
        /// Parameter name.
        param: String,
    },

    /// A required parameter with no value.
    #[error("{algorithm}: missing required parameter '{param}'")]
    MissingParam {
        /// Algorithm instance name.
        algorithm: String,
        /// Parameter name.
        param: String,
    },

    /// A value that does not parse or is out of range.
    #[error("{algorithm}: invalid value '{value}' for '{param}': {reason}")]
    InvalidValue {
        /// Algorithm instance name.
        algorithm: String,
        /// Parameter name.
        param: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A readout template that cannot be applied.
    #[error("{algorithm}: invalid readout template: {reason}")]
    InvalidReadout {
        /// Algorithm instance name.
        algorithm: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No factory registered under this algorithm type.
    #[error("unknown algorithm type '{0}'")]
    UnknownAlgorithm(String),

    /// Any other inconsistency in the configuration.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while an algorithm processes its stream.
///
/// Ordering and structural errors are fatal to the algorithm instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlgorithmError {
    /// Input earlier than what the algorithm has already seen.
    #[error("{algorithm}: out-of-order input at {time}, leading edge is {bound}")]
    OutOfOrder {
        /// Algorithm instance name.
        algorithm: String,
        /// Offending time.
        time: DaqTime,
        /// The bound it violated.
        bound: DaqTime,
    },

    /// A trigger formed from no hits.
    #[error("{algorithm}: cannot form a trigger from an empty hit list")]
    EmptyTrigger {
        /// Algorithm instance name.
        algorithm: String,
    },

    /// A payload kind this algorithm cannot process.
    #[error("{algorithm}: does not accept {kind} payloads")]
    UnsupportedPayload {
        /// Algorithm instance name.
        algorithm: String,
        /// Payload kind name.
        kind: &'static str,
    },

    /// A request starting before the watermark already published.
    #[error("{algorithm}: request at {first} precedes published watermark {watermark}")]
    BeforeWatermark {
        /// Algorithm instance name.
        algorithm: String,
        /// First time of the request.
        first: DaqTime,
        /// Published watermark.
        watermark: DaqTime,
    },

    /// Building the request failed.
    #[error("{algorithm}: {source}")]
    Payload {
        /// Algorithm instance name.
        algorithm: String,
        /// Underlying error.
        #[source]
        source: PayloadError,
    },
}
