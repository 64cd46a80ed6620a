//! State shared by every algorithm: identity, id sequence, request cache,
//! watermark and counters.

use serde::Serialize;
use tracing::{debug, warn};

use super::{
    build_readout, AlgorithmConfig, AlgorithmError, ReadoutTemplate, RequestCache,
    RequestIdGenerator,
};
use crate::payload::{Hit, ReadoutRequest, TriggerKey, TriggerRequest};
use crate::time::{DaqTime, Interval, MonotonicWatermark};

/// Read-only counters for one algorithm instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlgorithmStats {
    /// Instance name.
    pub name: String,
    /// Instance ordinal.
    pub instance: u32,
    /// Payloads delivered to the algorithm.
    pub inputs: u64,
    /// Hits that failed the acceptance predicate.
    pub rejected: u64,
    /// Requests emitted into the cache.
    pub emitted: u64,
    /// Requests handed to the collector.
    pub released: u64,
    /// Inputs or pending requests discarded without a trigger.
    pub dropped: u64,
    /// Requests freed at shutdown without release.
    pub recycled: u64,
    /// Requests currently cached.
    pub cached: usize,
    /// Inputs queued ahead of the algorithm, filled in by the runtime.
    pub queued: usize,
    /// Current watermark.
    pub watermark: DaqTime,
    /// True once the flush has been processed.
    pub flushed: bool,
}

/// Bookkeeping every [`TriggerAlgorithm`](super::TriggerAlgorithm) composes.
#[derive(Debug)]
pub struct AlgorithmCore {
    name: String,
    instance: u32,
    key: TriggerKey,
    readouts: Vec<ReadoutTemplate>,
    ids: RequestIdGenerator,
    cache: RequestCache,
    watermark: MonotonicWatermark,
    inputs: u64,
    rejected: u64,
    emitted: u64,
    released: u64,
    dropped: u64,
    recycled: u64,
    flushed: bool,
}

impl AlgorithmCore {
    /// Creates the core for a configured instance.
    #[must_use]
    pub fn new(config: &AlgorithmConfig, instance: u32) -> Self {
        Self {
            name: config.name.clone(),
            instance,
            key: config.key(),
            readouts: config.readouts.clone(),
            ids: RequestIdGenerator::new(),
            cache: RequestCache::new(),
            watermark: MonotonicWatermark::new(),
            inputs: 0,
            rejected: 0,
            emitted: 0,
            released: 0,
            dropped: 0,
            recycled: 0,
            flushed: false,
        }
    }

    /// Instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance ordinal.
    #[must_use]
    pub fn instance(&self) -> u32 {
        self.instance
    }

    /// Identity stamped on emitted requests.
    #[must_use]
    pub fn key(&self) -> TriggerKey {
        self.key
    }

    /// Current watermark.
    #[must_use]
    pub fn watermark(&self) -> DaqTime {
        self.watermark.current()
    }

    /// Advances the watermark; earlier candidates are ignored.
    pub fn advance_watermark(&mut self, candidate: DaqTime) {
        self.watermark.advance(candidate);
    }

    /// Cached requests.
    #[must_use]
    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    /// Returns true once the flush has been processed.
    #[must_use]
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub(crate) fn count_input(&mut self) {
        self.inputs += 1;
    }

    /// Counts a hit that failed the acceptance predicate.
    pub fn count_rejected(&mut self) {
        self.rejected += 1;
    }

    /// Counts discarded inputs.
    pub fn count_dropped(&mut self, n: u64) {
        self.dropped += n;
    }

    /// Builds an ordering error for this instance.
    #[must_use]
    pub fn out_of_order(&self, time: DaqTime, bound: DaqTime) -> AlgorithmError {
        AlgorithmError::OutOfOrder {
            algorithm: self.name.clone(),
            time,
            bound,
        }
    }

    /// Builds an unsupported-payload error for this instance.
    #[must_use]
    pub fn unsupported(&self, kind: &'static str) -> AlgorithmError {
        AlgorithmError::UnsupportedPayload {
            algorithm: self.name.clone(),
            kind,
        }
    }

    /// Builds an empty-trigger error for this instance.
    #[must_use]
    pub fn empty_trigger(&self) -> AlgorithmError {
        AlgorithmError::EmptyTrigger {
            algorithm: self.name.clone(),
        }
    }

    /// Emits a request spanning `[first, last]` with `hits` attached and
    /// caches it.
    ///
    /// # Errors
    ///
    /// Returns [`AlgorithmError::BeforeWatermark`] if `first` precedes the
    /// published watermark, or [`AlgorithmError::Payload`] for an inverted
    /// span.
    pub fn emit(
        &mut self,
        first: DaqTime,
        last: DaqTime,
        hits: Vec<Hit>,
    ) -> Result<(), AlgorithmError> {
        self.check_watermark(first)?;
        let uid = self.ids.next_uid();
        let readout = build_readout(uid, self.key.source, &self.readouts, first, last, &hits);
        let request = TriggerRequest::builder(uid, self.key)
            .span(first, last)
            .readout(readout)
            .hits(hits)
            .build()
            .map_err(|source| AlgorithmError::Payload {
                algorithm: self.name.clone(),
                source,
            })?;
        self.store(request);
        Ok(())
    }

    /// Emits a request wrapping `components`, spanning their union.
    ///
    /// The readout applies the configured templates over the components'
    /// hits; with no templates it is the union of the components' readouts.
    ///
    /// # Errors
    ///
    /// Returns [`AlgorithmError::EmptyTrigger`] for no components, or
    /// [`AlgorithmError::BeforeWatermark`] if the union starts before the
    /// published watermark.
    pub fn emit_wrapped(&mut self, components: Vec<TriggerRequest>) -> Result<(), AlgorithmError> {
        let (Some(first), Some(last)) = (
            components.iter().map(TriggerRequest::first_time).min(),
            components.iter().map(TriggerRequest::last_time).max(),
        ) else {
            return Err(self.empty_trigger());
        };
        self.check_watermark(first)?;
        let uid = self.ids.next_uid();
        let readout = if self.readouts.is_empty() {
            let mut readout = ReadoutRequest::new(uid, self.key.source);
            for component in &components {
                readout.extend_from(component.readout());
            }
            readout
        } else {
            let hits: Vec<Hit> = components
                .iter()
                .flat_map(|c| c.hits().iter().copied())
                .collect();
            build_readout(uid, self.key.source, &self.readouts, first, last, &hits)
        };
        let request = TriggerRequest::builder(uid, self.key)
            .span(first, last)
            .readout(readout)
            .components(components)
            .build()
            .map_err(|source| AlgorithmError::Payload {
                algorithm: self.name.clone(),
                source,
            })?;
        self.store(request);
        Ok(())
    }

    fn check_watermark(&self, first: DaqTime) -> Result<(), AlgorithmError> {
        let watermark = self.watermark.current();
        if first < watermark {
            return Err(AlgorithmError::BeforeWatermark {
                algorithm: self.name.clone(),
                first,
                watermark,
            });
        }
        Ok(())
    }

    fn store(&mut self, request: TriggerRequest) {
        debug!(
            algorithm = %self.name,
            uid = request.uid(),
            first = %request.first_time(),
            last = %request.last_time(),
            hits = request.hits().len(),
            "emitted trigger request"
        );
        self.emitted += 1;
        self.cache.insert(request);
    }

    /// Answers the collector's interval query from the cache.
    #[must_use]
    pub fn get_interval(&self, candidate: Interval) -> Option<Interval> {
        self.cache.get_interval(candidate, self.watermark.current())
    }

    /// Removes and returns cached requests inside `interval`.
    pub fn release(&mut self, interval: Interval) -> Vec<TriggerRequest> {
        let released = self.cache.release(interval);
        self.released += released.len() as u64;
        released
    }

    /// Marks the stream finished: the watermark moves to the flush time.
    pub fn finish(&mut self) {
        self.watermark.finish();
        self.flushed = true;
    }

    /// Frees every cached request; returns how many there were.
    pub fn recycle(&mut self) -> usize {
        let n = self.cache.drain().len();
        self.recycled += n as u64;
        n
    }

    /// Run-boundary reset of ids, watermark, cache and flush state.
    ///
    /// Counters are cumulative and survive.
    pub fn reset(&mut self) {
        let leftover = self.cache.drain().len();
        if leftover > 0 {
            warn!(algorithm = %self.name, leftover, "discarding cached requests on reset");
            self.recycled += leftover as u64;
        }
        self.ids.reset();
        self.watermark.reset();
        self.flushed = false;
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> AlgorithmStats {
        AlgorithmStats {
            name: self.name.clone(),
            instance: self.instance,
            inputs: self.inputs,
            rejected: self.rejected,
            emitted: self.emitted,
            released: self.released,
            dropped: self.dropped,
            recycled: self.recycled,
            cached: self.cache.len(),
            queued: 0,
            watermark: self.watermark.current(),
            flushed: self.flushed,
        }
    }
}
