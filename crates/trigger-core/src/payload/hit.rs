//! Detector hits and channel identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{PayloadError, SourceId};
use crate::time::DaqTime;

/// Positions at or above this value on a string are surface modules.
pub const SURFACE_POSITION_MIN: u8 = 61;

/// One detector channel: a module at `position` on `string`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ChannelId {
    /// String (cable) number.
    pub string: u16,
    /// Module position along the string, counted from the top.
    pub position: u8,
}

impl ChannelId {
    /// Creates a channel id.
    #[must_use]
    pub const fn new(string: u16, position: u8) -> Self {
        Self { string, position }
    }

    /// Returns true for surface (ice-top) modules.
    #[must_use]
    pub const fn is_surface(&self) -> bool {
        self.position >= SURFACE_POSITION_MIN
    }

    /// The hub that reads this channel out.
    #[must_use]
    pub const fn hub(&self) -> SourceId {
        if self.is_surface() {
            SourceId::icetop_hub(self.string)
        } else {
            SourceId::string_hub(self.string)
        }
    }

    /// Packs into a single integer, `string * 256 + position`.
    #[must_use]
    pub const fn packed(&self) -> u32 {
        (self.string as u32) << 8 | self.position as u32
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.string, self.position)
    }
}

/// Parses `string-position`, e.g. `21-30`.
impl FromStr for ChannelId {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PayloadError::Parse {
            what: "channel id",
            value: s.to_string(),
        };
        let (string, position) = s.trim().split_once('-').ok_or_else(err)?;
        Ok(Self {
            string: string.trim().parse().map_err(|_| err())?,
            position: position.trim().parse().map_err(|_| err())?,
        })
    }
}

/// Hit class reported by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitType {
    /// Single photo-electron discriminator crossing.
    Spe,
    /// Multi photo-electron discriminator crossing.
    Mpe,
    /// Forced-readout beacon.
    Beacon,
    /// Calibration flasher.
    Flasher,
    /// Any other front-end mode code.
    Other(u16),
}

impl HitType {
    /// Wire code of this type.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Spe => 1,
            Self::Mpe => 2,
            Self::Beacon => 3,
            Self::Flasher => 4,
            Self::Other(code) => code,
        }
    }

    /// Type for a wire code.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            1 => Self::Spe,
            2 => Self::Mpe,
            3 => Self::Beacon,
            4 => Self::Flasher,
            other => Self::Other(other),
        }
    }
}

/// Accepts `SPE`, `MPE`, `BEACON`, `FLASHER` (any case) or a numeric code.
impl FromStr for HitType {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SPE" => Ok(Self::Spe),
            "MPE" => Ok(Self::Mpe),
            "BEACON" => Ok(Self::Beacon),
            "FLASHER" => Ok(Self::Flasher),
            other => other
                .parse::<u16>()
                .map(Self::from_code)
                .map_err(|_| PayloadError::Parse {
                    what: "hit type",
                    value: s.to_string(),
                }),
        }
    }
}

impl fmt::Display for HitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spe => write!(f, "SPE"),
            Self::Mpe => write!(f, "MPE"),
            Self::Beacon => write!(f, "BEACON"),
            Self::Flasher => write!(f, "FLASHER"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}

/// A single time-stamped detector channel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hit {
    /// Time of the discriminator crossing.
    pub time: DaqTime,
    /// Channel that saw the hit.
    pub channel: ChannelId,
    /// Component that delivered the hit.
    pub source: SourceId,
    /// Front-end hit class.
    pub kind: HitType,
}

impl Hit {
    /// Creates a hit.
    #[must_use]
    pub const fn new(time: DaqTime, channel: ChannelId, source: SourceId, kind: HitType) -> Self {
        Self {
            time,
            channel,
            source,
            kind,
        }
    }

    /// An SPE hit delivered by the channel's own hub.
    #[must_use]
    pub const fn spe(time: DaqTime, channel: ChannelId) -> Self {
        Self::new(time, channel, channel.hub(), HitType::Spe)
    }
}
