//! Readout templates and readout construction.
//!
//! A template `(kind, offset, minus, plus)` turns a trigger span
//! `[first, last]` into the element span
//! `[first + offset - minus, last + offset + plus]`. Offsets are configured
//! in nanoseconds.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::payload::{
    ChannelId, Hit, ReadoutKind, ReadoutRequest, ReadoutRequestElement, ReadoutScope, SourceId,
};
use crate::time::{nanos_to_ticks, DaqTime};

/// One configured readout instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadoutTemplate {
    /// Part of the detector to read.
    pub kind: ReadoutKind,
    /// Shift applied to both ends, in ns.
    #[serde(default)]
    pub offset: i64,
    /// Extra time read before the trigger, in ns.
    #[serde(default)]
    pub minus: i64,
    /// Extra time read after the trigger, in ns.
    #[serde(default)]
    pub plus: i64,
}

impl ReadoutTemplate {
    /// Creates a template. Times are in ns.
    #[must_use]
    pub const fn new(kind: ReadoutKind, offset: i64, minus: i64, plus: i64) -> Self {
        Self {
            kind,
            offset,
            minus,
            plus,
        }
    }

    /// Element span for a trigger covering `[first, last]`.
    #[must_use]
    pub fn span(&self, first: DaqTime, last: DaqTime) -> (DaqTime, DaqTime) {
        let offset = nanos_to_ticks(self.offset);
        (
            first
                .saturating_add(offset)
                .saturating_sub(nanos_to_ticks(self.minus)),
            last.saturating_add(offset)
                .saturating_add(nanos_to_ticks(self.plus)),
        )
    }

    /// Checks the template can be applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidReadout`] for negative margins.
    pub fn validate(&self, algorithm: &str) -> Result<(), ConfigError> {
        if self.minus < 0 || self.plus < 0 {
            return Err(ConfigError::InvalidReadout {
                algorithm: algorithm.to_string(),
                reason: format!(
                    "{} margins must be non-negative (minus {}, plus {})",
                    self.kind, self.minus, self.plus
                ),
            });
        }
        Ok(())
    }
}

/// Builds the readout for a trigger request.
///
/// Global kinds yield one element addressed to [`SourceId::ANY`]. String
/// and module kinds yield one element per distinct string or module among
/// `hits`, addressed to the owning hub, in ascending channel order.
#[must_use]
pub fn build_readout(
    uid: u32,
    owner: SourceId,
    templates: &[ReadoutTemplate],
    first: DaqTime,
    last: DaqTime,
    hits: &[Hit],
) -> ReadoutRequest {
    let mut readout = ReadoutRequest::new(uid, owner);
    for template in templates {
        let (lo, hi) = template.span(first, last);
        let element = |source: SourceId, scope: ReadoutScope| ReadoutRequestElement {
            kind: template.kind,
            source,
            first: lo,
            last: hi,
            scope,
        };
        match template.kind {
            ReadoutKind::Global | ReadoutKind::InIceGlobal | ReadoutKind::IceTopGlobal => {
                readout.push(element(SourceId::ANY, ReadoutScope::All));
            }
            ReadoutKind::InIceString => {
                let strings: BTreeSet<u16> = hits
                    .iter()
                    .filter(|h| !h.channel.is_surface())
                    .map(|h| h.channel.string)
                    .collect();
                for string in strings {
                    readout.push(element(
                        SourceId::string_hub(string),
                        ReadoutScope::String(string),
                    ));
                }
            }
            ReadoutKind::InIceModule | ReadoutKind::IceTopModule => {
                let surface = template.kind == ReadoutKind::IceTopModule;
                let modules: BTreeSet<ChannelId> = hits
                    .iter()
                    .map(|h| h.channel)
                    .filter(|c| c.is_surface() == surface)
                    .collect();
                for channel in modules {
                    readout.push(element(channel.hub(), ReadoutScope::Module(channel)));
                }
            }
        }
    }
    readout
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(time: i64, string: u16, position: u8) -> Hit {
        Hit::spe(DaqTime::new(time), ChannelId::new(string, position))
    }

    #[test]
    fn test_template_span_in_ticks() {
        let t = ReadoutTemplate::new(ReadoutKind::Global, 100, 50, 25);
        let (lo, hi) = t.span(DaqTime::new(10_000), DaqTime::new(20_000));
        assert_eq!(lo, DaqTime::new(10_000 + 1000 - 500));
        assert_eq!(hi, DaqTime::new(20_000 + 1000 + 250));
    }

    #[test]
    fn test_negative_margin_rejected() {
        let t = ReadoutTemplate::new(ReadoutKind::Global, 0, -1, 0);
        assert!(matches!(
            t.validate("smt"),
            Err(ConfigError::InvalidReadout { .. })
        ));
    }

    #[test]
    fn test_global_readout_single_element() {
        let templates = [ReadoutTemplate::new(ReadoutKind::Global, 0, 10, 10)];
        let hits = [hit(100, 1, 1), hit(200, 2, 1)];
        let r = build_readout(
            7,
            SourceId::IN_ICE_TRIGGER,
            &templates,
            DaqTime::new(100),
            DaqTime::new(200),
            &hits,
        );
        assert_eq!(r.uid(), 7);
        assert_eq!(r.len(), 1);
        assert_eq!(r.elements()[0].source, SourceId::ANY);
        assert_eq!(r.elements()[0].first, DaqTime::new(0));
        assert_eq!(r.elements()[0].last, DaqTime::new(300));
    }

    #[test]
    fn test_string_and_module_readouts() {
        let templates = [
            ReadoutTemplate::new(ReadoutKind::InIceString, 0, 0, 0),
            ReadoutTemplate::new(ReadoutKind::IceTopModule, 0, 0, 0),
        ];
        let hits = [hit(1, 21, 3), hit(2, 21, 4), hit(3, 5, 10), hit(4, 5, 62)];
        let r = build_readout(
            0,
            SourceId::IN_ICE_TRIGGER,
            &templates,
            DaqTime::new(1),
            DaqTime::new(4),
            &hits,
        );
        let kinds: Vec<_> = r.elements().iter().map(|e| (e.kind, e.scope)).collect();
        assert_eq!(
            kinds,
            vec![
                (ReadoutKind::InIceString, ReadoutScope::String(5)),
                (ReadoutKind::InIceString, ReadoutScope::String(21)),
                (
                    ReadoutKind::IceTopModule,
                    ReadoutScope::Module(ChannelId::new(5, 62))
                ),
            ]
        );
        assert_eq!(r.elements()[1].source, SourceId::string_hub(21));
        assert_eq!(r.elements()[2].source, SourceId::icetop_hub(5));
    }
}
