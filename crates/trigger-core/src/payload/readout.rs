//! Readout requests: what to read out around a trigger.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{ChannelId, PayloadError, SourceId};
use crate::time::DaqTime;

/// Which part of the detector a readout element covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadoutKind {
    /// Everything.
    Global,
    /// Every in-ice channel.
    InIceGlobal,
    /// Every surface channel.
    IceTopGlobal,
    /// One in-ice string.
    InIceString,
    /// One in-ice module.
    InIceModule,
    /// One surface module.
    IceTopModule,
}

impl ReadoutKind {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Global => 0,
            Self::InIceGlobal => 1,
            Self::IceTopGlobal => 2,
            Self::InIceString => 3,
            Self::InIceModule => 4,
            Self::IceTopModule => 5,
        }
    }

    /// Kind for a wire code.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::UnknownReadoutKind`] for codes above 5.
    pub const fn from_code(code: u16) -> Result<Self, PayloadError> {
        Ok(match code {
            0 => Self::Global,
            1 => Self::InIceGlobal,
            2 => Self::IceTopGlobal,
            3 => Self::InIceString,
            4 => Self::InIceModule,
            5 => Self::IceTopModule,
            other => return Err(PayloadError::UnknownReadoutKind(other)),
        })
    }

    /// Returns true if elements of this kind are scoped to a single string.
    #[must_use]
    pub const fn is_string_scoped(self) -> bool {
        matches!(self, Self::InIceString)
    }

    /// Returns true if elements of this kind are scoped to one module.
    #[must_use]
    pub const fn is_module_scoped(self) -> bool {
        matches!(self, Self::InIceModule | Self::IceTopModule)
    }
}

impl FromStr for ReadoutKind {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GLOBAL" => Ok(Self::Global),
            "IN_ICE_GLOBAL" | "II_GLOBAL" => Ok(Self::InIceGlobal),
            "ICE_TOP_GLOBAL" | "IT_GLOBAL" => Ok(Self::IceTopGlobal),
            "IN_ICE_STRING" | "II_STRING" => Ok(Self::InIceString),
            "IN_ICE_MODULE" | "II_MODULE" => Ok(Self::InIceModule),
            "ICE_TOP_MODULE" | "IT_MODULE" => Ok(Self::IceTopModule),
            _ => Err(PayloadError::Parse {
                what: "readout kind",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ReadoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Global => "GLOBAL",
            Self::InIceGlobal => "IN_ICE_GLOBAL",
            Self::IceTopGlobal => "ICE_TOP_GLOBAL",
            Self::InIceString => "IN_ICE_STRING",
            Self::InIceModule => "IN_ICE_MODULE",
            Self::IceTopModule => "ICE_TOP_MODULE",
        };
        f.write_str(name)
    }
}

/// Channel scope of a readout element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadoutScope {
    /// No channel restriction.
    All,
    /// A single string.
    String(u16),
    /// A single module.
    Module(ChannelId),
}

/// One readout instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadoutRequestElement {
    /// What part of the detector to read.
    pub kind: ReadoutKind,
    /// Which hub to ask, or [`SourceId::ANY`].
    pub source: SourceId,
    /// First time to read, inclusive.
    pub first: DaqTime,
    /// Last time to read, inclusive.
    pub last: DaqTime,
    /// Channel restriction.
    pub scope: ReadoutScope,
}

/// The readout instructions attached to one trigger request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadoutRequest {
    uid: u32,
    source: SourceId,
    elements: SmallVec<[ReadoutRequestElement; 4]>,
}

impl ReadoutRequest {
    /// Creates an empty readout owned by `source`.
    #[must_use]
    pub fn new(uid: u32, source: SourceId) -> Self {
        Self {
            uid,
            source,
            elements: SmallVec::new(),
        }
    }

    /// Unique id, shared with the owning trigger request.
    #[must_use]
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Owning source.
    #[must_use]
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Appends an element.
    pub fn push(&mut self, element: ReadoutRequestElement) {
        self.elements.push(element);
    }

    /// Appends every element of `other`.
    pub fn extend_from(&mut self, other: &ReadoutRequest) {
        self.elements.extend(other.elements.iter().copied());
    }

    /// The elements, in insertion order.
    #[must_use]
    pub fn elements(&self) -> &[ReadoutRequestElement] {
        &self.elements
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Earliest first and latest last across elements.
    #[must_use]
    pub fn span(&self) -> Option<(DaqTime, DaqTime)> {
        let first = self.elements.iter().map(|e| e.first).min()?;
        let last = self.elements.iter().map(|e| e.last).max()?;
        Some((first, last))
    }
}
