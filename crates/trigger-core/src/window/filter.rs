//! Hit acceptance predicates.

use fxhash::FxHashSet;

use crate::payload::{ChannelId, Hit, HitType};

/// Accepts hits by type and by channel.
///
/// An unset criterion accepts everything.
#[derive(Debug, Clone, Default)]
pub struct HitFilter {
    kind: Option<HitType>,
    channels: Option<FxHashSet<ChannelId>>,
    in_ice_only: bool,
}

impl HitFilter {
    /// A filter accepting every hit.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts to one hit type.
    #[must_use]
    pub fn with_kind(mut self, kind: HitType) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Restricts to a channel set. An empty list leaves channels unrestricted.
    #[must_use]
    pub fn with_channels(mut self, channels: impl IntoIterator<Item = ChannelId>) -> Self {
        let set: FxHashSet<ChannelId> = channels.into_iter().collect();
        self.channels = (!set.is_empty()).then_some(set);
        self
    }

    /// Rejects surface channels.
    #[must_use]
    pub fn in_ice_only(mut self) -> Self {
        self.in_ice_only = true;
        self
    }

    /// Returns true if `hit` passes.
    #[inline]
    #[must_use]
    pub fn accepts(&self, hit: &Hit) -> bool {
        if self.kind.is_some_and(|k| k != hit.kind) {
            return false;
        }
        if self.in_ice_only && hit.channel.is_surface() {
            return false;
        }
        self.channels
            .as_ref()
            .map_or(true, |set| set.contains(&hit.channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::DaqTime;

    #[test]
    fn test_filter_any() {
        let hit = Hit::spe(DaqTime::ZERO, ChannelId::new(1, 1));
        assert!(HitFilter::any().accepts(&hit));
    }

    #[test]
    fn test_filter_kind_and_channels() {
        let filter = HitFilter::any()
            .with_kind(HitType::Spe)
            .with_channels([ChannelId::new(21, 30)]);
        assert!(filter.accepts(&Hit::spe(DaqTime::ZERO, ChannelId::new(21, 30))));
        assert!(!filter.accepts(&Hit::spe(DaqTime::ZERO, ChannelId::new(21, 31))));
        let mut flasher = Hit::spe(DaqTime::ZERO, ChannelId::new(21, 30));
        flasher.kind = HitType::Flasher;
        assert!(!filter.accepts(&flasher));
    }

    #[test]
    fn test_filter_in_ice_only() {
        let filter = HitFilter::any().in_ice_only();
        assert!(filter.accepts(&Hit::spe(DaqTime::ZERO, ChannelId::new(1, 60))));
        assert!(!filter.accepts(&Hit::spe(DaqTime::ZERO, ChannelId::new(1, 61))));
    }

    #[test]
    fn test_empty_channel_list_is_unrestricted() {
        let filter = HitFilter::any().with_channels(Vec::new());
        assert!(filter.accepts(&Hit::spe(DaqTime::ZERO, ChannelId::new(9, 9))));
    }
}
