//! Participant-side cache of emitted requests.

use crate::payload::TriggerRequest;
use crate::time::{DaqTime, Interval};

/// Emitted requests waiting for release, kept in first-time order.
///
/// Requests with equal first times keep emission order.
#[derive(Debug, Default, Clone)]
pub struct RequestCache {
    requests: Vec<TriggerRequest>,
}

impl RequestCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an emitted request.
    pub fn insert(&mut self, request: TriggerRequest) {
        let first = request.first_time();
        let at = self.requests.partition_point(|r| r.first_time() <= first);
        self.requests.insert(at, request);
    }

    /// Number of cached requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Cached requests in first-time order.
    pub fn iter(&self) -> impl Iterator<Item = &TriggerRequest> {
        self.requests.iter()
    }

    /// Span of the earliest cached request.
    #[must_use]
    pub fn earliest_span(&self) -> Interval {
        self.requests.first().map_or(Interval::EMPTY, TriggerRequest::interval)
    }

    /// First time of the most recent (latest-starting) cached request.
    #[must_use]
    pub fn latest_first(&self) -> Option<DaqTime> {
        self.requests.last().map(TriggerRequest::first_time)
    }

    /// Answers the collector's interval query.
    ///
    /// Restarts from the earliest cached span when `candidate` is empty or a
    /// cached request lies entirely before it, then widens with every
    /// overlapping request until stable. Returns `None` while
    /// `watermark < end`, since a later request could still start inside.
    #[must_use]
    pub fn get_interval(&self, candidate: Interval, watermark: DaqTime) -> Option<Interval> {
        let mut interval = candidate;
        if !self.requests.is_empty() {
            let restart = interval.is_empty()
                || self
                    .requests
                    .iter()
                    .any(|r| interval.is_after_span(r.last_time()));
            if restart {
                interval = self.earliest_span();
            }
            loop {
                let widened = self
                    .requests
                    .iter()
                    .filter(|r| interval.overlaps_span(r.first_time(), r.last_time()))
                    .fold(interval, |acc, r| acc.cover(r.first_time(), r.last_time()));
                if widened == interval {
                    break;
                }
                interval = widened;
            }
        }
        match interval.end() {
            Some(end) if watermark < end => None,
            _ => Some(interval),
        }
    }

    /// Removes and returns every cached request inside `interval`, in
    /// first-time order.
    pub fn release(&mut self, interval: Interval) -> Vec<TriggerRequest> {
        let (released, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.requests)
            .into_iter()
            .partition(|r| interval.contains_span(r.first_time(), r.last_time()));
        self.requests = kept;
        released
    }

    /// Removes and returns everything.
    pub fn drain(&mut self) -> Vec<TriggerRequest> {
        std::mem::take(&mut self.requests)
    }
}
