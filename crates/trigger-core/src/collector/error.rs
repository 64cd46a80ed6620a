//! Collector errors.

use crate::payload::PayloadError;
use crate::time::{DaqTime, Interval};

/// Errors raised while negotiating or releasing intervals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectorError {
    /// A participant could not answer.
    #[error("participant '{participant}' failed: {reason}")]
    Participant {
        /// Participant name.
        participant: String,
        /// What went wrong.
        reason: String,
    },

    /// A participant released a request outside the agreed interval.
    #[error(
        "participant '{participant}' released request #{uid} [{first}, {last}] outside {interval}"
    )]
    OutsideInterval {
        /// Participant name.
        participant: String,
        /// Request uid.
        uid: u32,
        /// Request first time.
        first: DaqTime,
        /// Request last time.
        last: DaqTime,
        /// The released interval.
        interval: Interval,
    },

    /// A batch starting before the previous batch.
    #[error("release batch starts at {first}, before previous batch at {previous}")]
    OutOfOrder {
        /// First time of the new batch.
        first: DaqTime,
        /// First time of the previous batch.
        previous: DaqTime,
    },

    /// The configured final source is not a participant.
    #[error("final source '{0}' is not a participant")]
    UnknownFinalSource(String),

    /// Building a merged request failed.
    #[error("merge error: {0}")]
    Payload(#[from] PayloadError),
}

impl CollectorError {
    /// Builds a participant failure.
    pub fn participant(participant: impl Into<String>, reason: impl ToString) -> Self {
        Self::Participant {
            participant: participant.into(),
            reason: reason.to_string(),
        }
    }
}
