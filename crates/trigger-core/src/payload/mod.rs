//! # Payload Model
//!
//! The records that flow through the trigger layer:
//!
//! - [`Hit`]: one time-stamped detector channel event
//! - [`TriggerRequest`]: an emitted decision bounding a time span, with a
//!   [`ReadoutRequest`] describing what to read out
//! - [`Payload`]: what a strand carries, either a hit or a request
//!
//! Identifiers ([`SourceId`], [`ChannelId`], [`TriggerKey`]) live here too.
//! The binary layout used at the byte boundary is in [`codec`].

pub mod codec;
mod hit;
mod readout;
mod request;

pub use hit::{ChannelId, Hit, HitType, SURFACE_POSITION_MIN};
pub use readout::{ReadoutKind, ReadoutRequest, ReadoutRequestElement, ReadoutScope};
pub use request::{TriggerRequest, TriggerRequestBuilder, FLUSH_UID, MERGED_TRIGGER_TYPE};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::time::{DaqTime, Flushable, Timed};

/// Errors building or decoding payloads.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PayloadError {
    /// A span whose first time is after its last time.
    #[error("inverted span: first {first} is after last {last}")]
    InvertedSpan {
        /// Offending first time.
        first: DaqTime,
        /// Offending last time.
        last: DaqTime,
    },

    /// Not enough bytes to decode a record.
    #[error("truncated record: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// Unknown record tag at the byte boundary.
    #[error("unknown record tag {0}")]
    UnknownTag(u16),

    /// Unknown readout kind code.
    #[error("unknown readout kind {0}")]
    UnknownReadoutKind(u16),

    /// Components nested deeper than the decoder accepts.
    #[error("request components nested deeper than {limit}")]
    TooDeep {
        /// Deepest nesting accepted.
        limit: usize,
    },

    /// Text that does not parse as an identifier.
    #[error("cannot parse '{value}' as {what}")]
    Parse {
        /// What was being parsed.
        what: &'static str,
        /// The text.
        value: String,
    },
}

/// Numeric id of a DAQ component (string hub, trigger, ...).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SourceId(pub u32);

impl SourceId {
    /// Wildcard source used by readout elements with no source scope.
    pub const ANY: Self = Self(u32::MAX);
    /// The in-ice trigger.
    pub const IN_ICE_TRIGGER: Self = Self(4000);
    /// The ice-top trigger.
    pub const ICETOP_TRIGGER: Self = Self(5000);
    /// The global trigger.
    pub const GLOBAL_TRIGGER: Self = Self(6000);
    /// Base id of in-ice string hubs; hub `n` is `12000 + n`.
    pub const STRING_HUB_BASE: u32 = 12_000;
    /// Base id of surface hubs.
    pub const ICETOP_HUB_BASE: u32 = 12_200;

    /// The hub reading out in-ice string `string`.
    #[must_use]
    pub const fn string_hub(string: u16) -> Self {
        Self(Self::STRING_HUB_BASE + string as u32)
    }

    /// The hub reading out surface station `station`.
    #[must_use]
    pub const fn icetop_hub(station: u16) -> Self {
        Self(Self::ICETOP_HUB_BASE + station as u32)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ANY {
            write!(f, "*")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Identifies one configured trigger: `(type, config id, source)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerKey {
    /// Trigger type code.
    pub trigger_type: i32,
    /// Trigger configuration id.
    pub config_id: i32,
    /// Source of the trigger.
    pub source: SourceId,
}

impl TriggerKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(trigger_type: i32, config_id: i32, source: SourceId) -> Self {
        Self {
            trigger_type,
            config_id,
            source,
        }
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.trigger_type, self.config_id, self.source)
    }
}

/// Parses `type:config:source`, e.g. `0:1006:4000`.
impl FromStr for TriggerKey {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PayloadError::Parse {
            what: "trigger key",
            value: s.to_string(),
        };
        let mut parts = s.trim().split(':');
        let trigger_type = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let config_id = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let source = match parts.next().ok_or_else(err)? {
            "*" => SourceId::ANY,
            id => SourceId(id.parse().map_err(|_| err())?),
        };
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self::new(trigger_type, config_id, source))
    }
}

/// An item carried by a strand.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A raw detector hit.
    Hit(Hit),
    /// A trigger request from an upstream tier, or the flush sentinel.
    Request(TriggerRequest),
}

impl Payload {
    /// Returns the hit, if this is one.
    #[must_use]
    pub fn as_hit(&self) -> Option<&Hit> {
        match self {
            Self::Hit(hit) => Some(hit),
            Self::Request(_) => None,
        }
    }

    /// Returns the request, if this is one.
    #[must_use]
    pub fn as_request(&self) -> Option<&TriggerRequest> {
        match self {
            Self::Request(req) => Some(req),
            Self::Hit(_) => None,
        }
    }

    /// Short name for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Hit(_) => "hit",
            Self::Request(req) if req.is_flush() => "flush",
            Self::Request(_) => "trigger request",
        }
    }
}

impl Timed for Payload {
    fn time(&self) -> DaqTime {
        match self {
            Self::Hit(hit) => hit.time,
            Self::Request(req) => req.first_time(),
        }
    }
}

impl Flushable for Payload {
    fn flush_sentinel() -> Self {
        Self::Request(TriggerRequest::flush_sentinel())
    }

    fn is_flush(&self) -> bool {
        matches!(self, Self::Request(req) if req.is_flush())
    }
}

impl Timed for Hit {
    fn time(&self) -> DaqTime {
        self.time
    }
}

impl Timed for TriggerRequest {
    fn time(&self) -> DaqTime {
        self.first_time()
    }
}

impl Flushable for TriggerRequest {
    fn flush_sentinel() -> Self {
        TriggerRequest::flush_sentinel()
    }

    fn is_flush(&self) -> bool {
        TriggerRequest::is_flush(self)
    }
}

impl From<Hit> for Payload {
    fn from(hit: Hit) -> Self {
        Self::Hit(hit)
    }
}

impl From<TriggerRequest> for Payload {
    fn from(req: TriggerRequest) -> Self {
        Self::Request(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_key_parse() {
        let key: TriggerKey = "0:1006:4000".parse().unwrap();
        assert_eq!(key, TriggerKey::new(0, 1006, SourceId::IN_ICE_TRIGGER));
        assert_eq!(key.to_string(), "0:1006:4000");

        assert!("0:1006".parse::<TriggerKey>().is_err());
        assert!("0:1006:4000:1".parse::<TriggerKey>().is_err());
        assert!("a:b:c".parse::<TriggerKey>().is_err());
    }

    #[test]
    fn test_hub_ids() {
        assert_eq!(SourceId::string_hub(21), SourceId(12_021));
        assert_eq!(SourceId::icetop_hub(3), SourceId(12_203));
        assert_eq!(SourceId::ANY.to_string(), "*");
    }

    #[test]
    fn test_payload_time_and_flush() {
        let hit = Hit::new(
            DaqTime::new(42),
            ChannelId::new(1, 1),
            SourceId::string_hub(1),
            HitType::Spe,
        );
        let payload = Payload::from(hit);
        assert_eq!(payload.time(), DaqTime::new(42));
        assert!(!payload.is_flush());
        assert_eq!(payload.kind_name(), "hit");

        let flush = Payload::flush_sentinel();
        assert!(flush.is_flush());
        assert_eq!(flush.time(), DaqTime::MAX);
        assert_eq!(flush.kind_name(), "flush");
    }
}
