//! Trigger requests.

use std::fmt;

use super::{Hit, PayloadError, ReadoutRequest, SourceId, TriggerKey};
use crate::time::{DaqTime, Interval};

/// Uid carried by the flush sentinel.
pub const FLUSH_UID: u32 = u32::MAX;

/// Trigger type of requests produced by merging overlapping requests.
pub const MERGED_TRIGGER_TYPE: i32 = -1;

const FLUSH_KEY: TriggerKey = TriggerKey::new(i32::MAX, -1, SourceId::ANY);

/// A decision to persist the span `[first, last]`.
///
/// Built through [`TriggerRequestBuilder`], which enforces `first <= last`.
/// Requests are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRequest {
    uid: u32,
    key: TriggerKey,
    first: DaqTime,
    last: DaqTime,
    readout: ReadoutRequest,
    hits: Vec<Hit>,
    components: Vec<TriggerRequest>,
}

impl TriggerRequest {
    /// Starts building a request.
    #[must_use]
    pub fn builder(uid: u32, key: TriggerKey) -> TriggerRequestBuilder {
        TriggerRequestBuilder {
            uid,
            key,
            first: DaqTime::ZERO,
            last: DaqTime::ZERO,
            readout: None,
            hits: Vec::new(),
            components: Vec::new(),
        }
    }

    /// The end-of-stream sentinel.
    #[must_use]
    pub fn flush_sentinel() -> Self {
        Self {
            uid: FLUSH_UID,
            key: FLUSH_KEY,
            first: DaqTime::MAX,
            last: DaqTime::MAX,
            readout: ReadoutRequest::new(FLUSH_UID, SourceId::ANY),
            hits: Vec::new(),
            components: Vec::new(),
        }
    }

    /// Returns true for the end-of-stream sentinel.
    #[inline]
    #[must_use]
    pub fn is_flush(&self) -> bool {
        self.uid == FLUSH_UID && self.first.is_flush()
    }

    /// Returns true for requests built by merging overlapping requests.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.key.trigger_type == MERGED_TRIGGER_TYPE
    }

    /// Request uid.
    #[inline]
    #[must_use]
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// `(type, config id, source)` of the trigger that emitted this.
    #[inline]
    #[must_use]
    pub fn key(&self) -> TriggerKey {
        self.key
    }

    /// Trigger type.
    #[must_use]
    pub fn trigger_type(&self) -> i32 {
        self.key.trigger_type
    }

    /// Trigger configuration id.
    #[must_use]
    pub fn config_id(&self) -> i32 {
        self.key.config_id
    }

    /// Emitting source.
    #[must_use]
    pub fn source(&self) -> SourceId {
        self.key.source
    }

    /// First time, inclusive.
    #[inline]
    #[must_use]
    pub fn first_time(&self) -> DaqTime {
        self.first
    }

    /// Last time, inclusive.
    #[inline]
    #[must_use]
    pub fn last_time(&self) -> DaqTime {
        self.last
    }

    /// The smallest interval holding this request.
    #[must_use]
    pub fn interval(&self) -> Interval {
        Interval::covering(self.first, self.last)
    }

    /// Width of the request in ticks.
    #[must_use]
    pub fn width(&self) -> i64 {
        self.last.since(self.first)
    }

    /// Readout instructions.
    #[must_use]
    pub fn readout(&self) -> &ReadoutRequest {
        &self.readout
    }

    /// Hits that formed the trigger.
    #[must_use]
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Constituent requests of a wrapped or merged request.
    #[must_use]
    pub fn components(&self) -> &[TriggerRequest] {
        &self.components
    }

    /// Returns true if the inclusive spans share a tick.
    #[must_use]
    pub fn overlaps(&self, other: &TriggerRequest) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

impl fmt::Display for TriggerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_flush() {
            return write!(f, "TriggerRequest[FLUSH]");
        }
        write!(
            f,
            "TriggerRequest[#{} {} {}-{} hits={} components={}]",
            self.uid,
            self.key,
            self.first,
            self.last,
            self.hits.len(),
            self.components.len()
        )
    }
}

/// Builder for [`TriggerRequest`].
#[derive(Debug, Clone)]
#[must_use]
pub struct TriggerRequestBuilder {
    uid: u32,
    key: TriggerKey,
    first: DaqTime,
    last: DaqTime,
    readout: Option<ReadoutRequest>,
    hits: Vec<Hit>,
    components: Vec<TriggerRequest>,
}

impl TriggerRequestBuilder {
    /// Sets the inclusive span.
    pub fn span(mut self, first: DaqTime, last: DaqTime) -> Self {
        self.first = first;
        self.last = last;
        self
    }

    /// Sets the readout. Defaults to an empty readout owned by the key's source.
    pub fn readout(mut self, readout: ReadoutRequest) -> Self {
        self.readout = Some(readout);
        self
    }

    /// Attaches contributing hits.
    pub fn hits(mut self, hits: Vec<Hit>) -> Self {
        self.hits = hits;
        self
    }

    /// Attaches constituent requests.
    pub fn components(mut self, components: Vec<TriggerRequest>) -> Self {
        self.components = components;
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::InvertedSpan`] if first is after last.
    pub fn build(self) -> Result<TriggerRequest, PayloadError> {
        if self.first > self.last {
            return Err(PayloadError::InvertedSpan {
                first: self.first,
                last: self.last,
            });
        }
        let readout = self
            .readout
            .unwrap_or_else(|| ReadoutRequest::new(self.uid, self.key.source));
        Ok(TriggerRequest {
            uid: self.uid,
            key: self.key,
            first: self.first,
            last: self.last,
            readout,
            hits: self.hits,
            components: self.components,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::ChannelId;

    fn key() -> TriggerKey {
        TriggerKey::new(0, 1006, SourceId::IN_ICE_TRIGGER)
    }

    #[test]
    fn test_builder_rejects_inverted_span() {
        let err = TriggerRequest::builder(1, key())
            .span(DaqTime::new(10), DaqTime::new(5))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            PayloadError::InvertedSpan {
                first: DaqTime::new(10),
                last: DaqTime::new(5)
            }
        );
    }

    #[test]
    fn test_builder_defaults() {
        let hit = Hit::spe(DaqTime::new(10), ChannelId::new(1, 1));
        let req = TriggerRequest::builder(3, key())
            .span(DaqTime::new(10), DaqTime::new(10))
            .hits(vec![hit])
            .build()
            .unwrap();
        assert_eq!(req.uid(), 3);
        assert_eq!(req.readout().source(), SourceId::IN_ICE_TRIGGER);
        assert_eq!(req.readout().uid(), 3);
        assert_eq!(req.hits().len(), 1);
        assert_eq!(req.width(), 0);
        assert!(!req.is_flush());
        assert!(!req.is_merged());
    }

    #[test]
    fn test_flush_sentinel() {
        let flush = TriggerRequest::flush_sentinel();
        assert!(flush.is_flush());
        assert_eq!(flush.first_time(), DaqTime::MAX);
        assert_eq!(flush.to_string(), "TriggerRequest[FLUSH]");
    }

    #[test]
    fn test_overlaps_is_inclusive() {
        let a = TriggerRequest::builder(1, key())
            .span(DaqTime::new(0), DaqTime::new(100))
            .build()
            .unwrap();
        let b = TriggerRequest::builder(2, key())
            .span(DaqTime::new(100), DaqTime::new(200))
            .build()
            .unwrap();
        let c = TriggerRequest::builder(3, key())
            .span(DaqTime::new(101), DaqTime::new(200))
            .build()
            .unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
