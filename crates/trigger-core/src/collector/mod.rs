//! # Collector
//!
//! Interval negotiation and release across trigger algorithms.
//!
//! Every algorithm caches the requests it emits and publishes a watermark.
//! The [`Collector`] looks for an interval all of them agree is final: it
//! offers a candidate to each [`Participant`] in turn, and each answers with
//! the candidate widened over its own overlapping requests, or `None` while
//! its watermark has not passed the candidate's end. Passes repeat until no
//! participant changes the candidate. The agreed interval is then released
//! from every participant, checked, and forwarded as one time-ordered batch.
//!
//! ```text
//!   candidate ──► P0.get_interval ──► P1.get_interval ──► ... ──► Pn
//!       ▲                                                        │
//!       └─────────────── changed? another pass ◄─────────────────┘
//!                        stable?  release(interval) on every Pi
//! ```
//!
//! A `None` ends the round; the candidate is kept for the next poll.

mod config;
mod error;
mod merge;

pub use config::{CollectorConfig, DEFAULT_POLL_INTERVAL_MS};
pub use error::CollectorError;
pub use merge::{merge_overlapping, MERGED_CONFIG_ID};

use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::algorithm::{AlgorithmCore, RequestIdGenerator, TriggerAlgorithm};
use crate::payload::TriggerRequest;
use crate::time::{DaqTime, Interval, WatermarkTracker};

/// A participant's progress, sampled once per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParticipantProgress {
    /// Current watermark.
    pub watermark: DaqTime,
    /// True once the participant has processed the flush.
    pub flushed: bool,
    /// Requests cached.
    pub cached: usize,
    /// Span of the earliest cached request.
    pub earliest: Interval,
    /// First time of the latest-starting cached request.
    pub latest_first: Option<DaqTime>,
}

impl From<&AlgorithmCore> for ParticipantProgress {
    fn from(core: &AlgorithmCore) -> Self {
        Self {
            watermark: core.watermark(),
            flushed: core.is_flushed(),
            cached: core.cache().len(),
            earliest: core.cache().earliest_span(),
            latest_first: core.cache().latest_first(),
        }
    }
}

/// One side of the interval negotiation.
///
/// Implemented directly by algorithms, and by runtime handles that forward
/// the calls to an algorithm owned by another thread.
pub trait Participant {
    /// Participant name, used in logs and errors.
    fn name(&self) -> &str;

    /// Widens `candidate` over cached requests, or `None` if not final yet.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Participant`] if the participant is gone.
    fn get_interval(&mut self, candidate: Interval) -> Result<Option<Interval>, CollectorError>;

    /// Removes and returns cached requests inside `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Participant`] if the participant is gone.
    fn release(&mut self, interval: Interval) -> Result<Vec<TriggerRequest>, CollectorError>;

    /// Samples the participant's progress.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Participant`] if the participant is gone.
    fn progress(&mut self) -> Result<ParticipantProgress, CollectorError>;

    /// Frees every cached request; returns how many there were.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Participant`] if the participant is gone.
    fn recycle(&mut self) -> Result<usize, CollectorError>;
}

impl Participant for Box<dyn TriggerAlgorithm> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get_interval(&mut self, candidate: Interval) -> Result<Option<Interval>, CollectorError> {
        Ok((**self).get_interval(candidate))
    }

    fn release(&mut self, interval: Interval) -> Result<Vec<TriggerRequest>, CollectorError> {
        Ok((**self).release(interval))
    }

    fn progress(&mut self) -> Result<ParticipantProgress, CollectorError> {
        Ok(ParticipantProgress::from((**self).core()))
    }

    fn recycle(&mut self) -> Result<usize, CollectorError> {
        Ok((**self).recycle())
    }
}

/// Collector counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    /// Polls run.
    pub rounds: u64,
    /// Non-empty batches released.
    pub batches: u64,
    /// Requests forwarded, after merging.
    pub released: u64,
    /// Merged requests built.
    pub merged: u64,
    /// Candidates abandoned for exceeding the maximum width.
    pub restarts: u64,
    /// Containment or ordering violations detected on release.
    pub violations: u64,
    /// Requests freed at shutdown without release.
    pub recycled: u64,
    /// Minimum watermark across participants.
    pub watermark: DaqTime,
}

/// Negotiates final intervals and releases them from every participant.
pub struct Collector<P> {
    config: CollectorConfig,
    participants: Vec<P>,
    final_source: Option<usize>,
    candidate: Interval,
    previous_first: Option<DaqTime>,
    ids: RequestIdGenerator,
    watermarks: WatermarkTracker,
    finished: bool,
    stats: CollectorStats,
}

impl<P: Participant> Collector<P> {
    /// Creates a collector over `participants`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::UnknownFinalSource`] if the configured final
    /// source names no participant.
    pub fn new(config: CollectorConfig, participants: Vec<P>) -> Result<Self, CollectorError> {
        let final_source = match &config.final_source {
            Some(name) => Some(
                participants
                    .iter()
                    .position(|p| p.name() == name)
                    .ok_or_else(|| CollectorError::UnknownFinalSource(name.clone()))?,
            ),
            None => None,
        };
        let watermarks = WatermarkTracker::new(participants.len());
        Ok(Self {
            config,
            participants,
            final_source,
            candidate: Interval::EMPTY,
            previous_first: None,
            ids: RequestIdGenerator::new(),
            watermarks,
            finished: false,
            stats: CollectorStats::default(),
        })
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// The participants.
    #[must_use]
    pub fn participants(&self) -> &[P] {
        &self.participants
    }

    /// The participants, mutably.
    pub fn participants_mut(&mut self) -> &mut [P] {
        &mut self.participants
    }

    /// Candidate carried over to the next poll.
    #[must_use]
    pub fn candidate(&self) -> Interval {
        self.candidate
    }

    /// Returns true once every participant is flushed and has nothing cached.
    ///
    /// Updated at the start of each poll.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            watermark: self.watermarks.combined(),
            ..self.stats.clone()
        }
    }

    /// Runs one negotiation round.
    ///
    /// Returns the released batch, in first-time order, or `None` when no
    /// interval could be finalized.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError`] if a participant fails, releases a request
    /// outside the agreed interval, or a batch would go back in time.
    pub fn poll(&mut self) -> Result<Option<Vec<TriggerRequest>>, CollectorError> {
        self.stats.rounds += 1;
        let progress = self.refresh_progress()?;
        if self.finished {
            return Ok(None);
        }
        let Some(interval) = self.negotiate(&progress)? else {
            return Ok(None);
        };
        if interval.is_empty() || !self.final_source_ready(interval, &progress) {
            return Ok(None);
        }
        let batch = self.release(interval)?;
        Ok((!batch.is_empty()).then_some(batch))
    }

    /// Polls until no further interval can be finalized, handing each batch
    /// to `sink`. Returns the number of requests forwarded.
    ///
    /// # Errors
    ///
    /// Returns the first [`CollectorError`] raised by a poll.
    pub fn drain(&mut self, mut sink: impl FnMut(Vec<TriggerRequest>)) -> Result<usize, CollectorError> {
        let mut forwarded = 0;
        while let Some(batch) = self.poll()? {
            forwarded += batch.len();
            sink(batch);
        }
        Ok(forwarded)
    }

    /// Recycles whatever is still cached and returns the final counters.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Participant`] if a participant is gone.
    pub fn shutdown(&mut self) -> Result<CollectorStats, CollectorError> {
        let mut recycled = 0;
        for participant in &mut self.participants {
            let n = participant.recycle()?;
            if n > 0 {
                warn!(participant = participant.name(), recycled = n, "unreleased requests recycled");
            }
            recycled += n;
        }
        self.stats.recycled += recycled as u64;
        let stats = self.stats();
        if recycled > 0 {
            warn!(recycled, released = stats.released, "collector shut down with unreleased requests");
        } else {
            info!(released = stats.released, batches = stats.batches, "collector shut down");
        }
        Ok(stats)
    }

    /// Run-boundary reset of the candidate, ordering check and merged ids.
    ///
    /// Participants are reset separately. Counters survive.
    pub fn reset(&mut self) {
        self.candidate = Interval::EMPTY;
        self.previous_first = None;
        self.ids.reset();
        self.watermarks.reset();
        self.finished = false;
    }

    fn refresh_progress(&mut self) -> Result<Vec<ParticipantProgress>, CollectorError> {
        let mut progress = Vec::with_capacity(self.participants.len());
        for (index, participant) in self.participants.iter_mut().enumerate() {
            let p = participant.progress()?;
            self.watermarks.update(index, p.watermark);
            progress.push(p);
        }
        self.finished = progress.iter().all(|p| p.flushed && p.cached == 0);
        Ok(progress)
    }

    fn negotiate(
        &mut self,
        progress: &[ParticipantProgress],
    ) -> Result<Option<Interval>, CollectorError> {
        let max_width = self.config.max_width_ticks();
        let mut candidate = self.candidate;
        let mut restarted = false;
        loop {
            let mut changed = false;
            for (index, participant) in self.participants.iter_mut().enumerate() {
                let Some(mut next) = participant.get_interval(candidate)? else {
                    trace!(participant = participant.name(), %candidate, "interval not final");
                    self.candidate = candidate;
                    return Ok(None);
                };
                if next == candidate {
                    continue;
                }
                if let Some(max) = max_width {
                    if !restarted && next.width() > max {
                        let restart = progress.get(index).map_or(Interval::EMPTY, |p| p.earliest);
                        warn!(
                            participant = participant.name(),
                            width = next.width(),
                            max,
                            %restart,
                            "candidate too wide, restarting"
                        );
                        self.stats.restarts += 1;
                        restarted = true;
                        next = restart;
                    }
                }
                candidate = next;
                changed = true;
            }
            if !changed {
                break;
            }
        }
        self.candidate = candidate;
        Ok(Some(candidate))
    }

    fn final_source_ready(&self, interval: Interval, progress: &[ParticipantProgress]) -> bool {
        let Some(p) = self.final_source.and_then(|index| progress.get(index)) else {
            return true;
        };
        let Some(end) = interval.end() else {
            return true;
        };
        if p.flushed {
            return true;
        }
        let reference = p.latest_first.unwrap_or(p.watermark);
        end.saturating_add(self.config.request_width_ticks()) <= reference
    }

    fn release(&mut self, interval: Interval) -> Result<Vec<TriggerRequest>, CollectorError> {
        // Everything is pulled before anything is checked, so a failure
        // accounts for requests already taken from other participants.
        let mut gathered: Vec<(usize, Vec<TriggerRequest>)> =
            Vec::with_capacity(self.participants.len());
        for (index, participant) in self.participants.iter_mut().enumerate() {
            match participant.release(interval) {
                Ok(released) => gathered.push((index, released)),
                Err(e) => {
                    self.discard(gathered.iter().map(|(_, r)| r.len()).sum());
                    return Err(e);
                }
            }
        }

        let outside = gathered.iter().find_map(|(index, released)| {
            released
                .iter()
                .find(|r| !interval.contains_span(r.first_time(), r.last_time()))
                .map(|r| (*index, r.uid(), r.first_time(), r.last_time()))
        });
        if let Some((index, uid, first, last)) = outside {
            let participant = self.participants[index].name().to_string();
            self.stats.violations += 1;
            error!(
                %participant,
                uid,
                %first,
                %last,
                %interval,
                "request released outside interval"
            );
            self.discard(gathered.iter().map(|(_, r)| r.len()).sum());
            return Err(CollectorError::OutsideInterval {
                participant,
                uid,
                first,
                last,
                interval,
            });
        }

        let mut batch: Vec<TriggerRequest> =
            gathered.into_iter().flat_map(|(_, released)| released).collect();
        self.candidate = Interval::EMPTY;
        batch.sort_by_key(TriggerRequest::first_time);

        if let (Some(first), Some(previous)) =
            (batch.first().map(TriggerRequest::first_time), self.previous_first)
        {
            if first < previous {
                self.stats.violations += 1;
                error!(%first, %previous, %interval, "release batch out of order");
                self.discard(batch.len());
                return Err(CollectorError::OutOfOrder { first, previous });
            }
        }
        if let Some(last) = batch.last() {
            self.previous_first = Some(last.first_time());
        }

        if self.config.merge_overlapping {
            let (merged_batch, merged) =
                merge_overlapping(batch, &mut self.ids, self.config.merged_source)?;
            batch = merged_batch;
            self.stats.merged += merged as u64;
        }
        if !batch.is_empty() {
            self.stats.batches += 1;
            self.stats.released += batch.len() as u64;
            debug!(%interval, requests = batch.len(), "released batch");
        }
        Ok(batch)
    }
}

impl<P> Collector<P> {
    /// Counts requests taken from participants but never forwarded.
    fn discard(&mut self, requests: usize) {
        if requests > 0 {
            warn!(requests, "released requests recycled after a failed release");
            self.stats.recycled += requests as u64;
        }
    }
}

impl<P> std::fmt::Debug for Collector<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("participants", &self.participants.len())
            .field("candidate", &self.candidate)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
