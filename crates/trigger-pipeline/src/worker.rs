//! # Algorithm Workers
//!
//! Each algorithm instance is owned by one worker thread. Everything else
//! talks to it through its inbox: the splicer worker feeds payloads, the
//! collector sends commands and waits on a one-slot reply queue.
//!
//! ```text
//!   splicer ──Payload──┐
//!                      ├──▶ inbox ──▶ worker (owns Box<dyn TriggerAlgorithm>)
//!   collector ─Command─┘                  │
//!        ▲                                │
//!        └────────── reply queue ◄────────┘
//! ```
//!
//! An algorithm that fails keeps answering commands, so the collector can
//! still see the failure and the run can be wound down. Its later input is
//! dropped and counted.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use trigger_core::algorithm::{AlgorithmError, AlgorithmStats, TriggerAlgorithm};
use trigger_core::collector::{CollectorError, Participant, ParticipantProgress};
use trigger_core::payload::{Payload, TriggerRequest};
use trigger_core::streaming::{channel, channel_with_config, ChannelConfig, Consumer, Producer};
use trigger_core::time::{Flushable, Interval};

use crate::PipelineError;

/// Messages delivered to an algorithm worker.
#[derive(Debug, Clone)]
pub enum AlgorithmMessage {
    /// Next payload of the ordered stream
    Payload(Payload),
    /// Interval query
    GetInterval {
        /// Candidate to widen
        candidate: Interval,
        /// Reply queue
        reply: Producer<Option<Interval>>,
    },
    /// Release cached requests inside an interval
    Release {
        /// Agreed interval
        interval: Interval,
        /// Reply queue
        reply: Producer<Vec<TriggerRequest>>,
    },
    /// Progress sample for the collector
    Progress {
        /// Reply queue
        reply: Producer<ParticipantProgress>,
    },
    /// Counter snapshot
    Stats {
        /// Reply queue
        reply: Producer<AlgorithmStats>,
    },
    /// Free every cached request
    Recycle {
        /// Reply queue
        reply: Producer<usize>,
    },
    /// Run-boundary reset
    Reset {
        /// Reply queue
        reply: Producer<()>,
    },
    /// Stop the worker
    Shutdown,
}

type Failure = Arc<Mutex<Option<AlgorithmError>>>;

/// Cloneable handle to an algorithm worker.
///
/// Implements [`Participant`] by forwarding every call as a message and
/// blocking on the reply.
#[derive(Clone)]
pub struct AlgorithmHandle {
    name: String,
    inbox: Producer<AlgorithmMessage>,
    failure: Failure,
}

impl AlgorithmHandle {
    /// Instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Producer feeding the worker's inbox.
    #[must_use]
    pub fn inbox(&self) -> Producer<AlgorithmMessage> {
        self.inbox.clone()
    }

    /// Messages waiting in the inbox.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inbox.len()
    }

    /// The error that stopped the algorithm, if any.
    #[must_use]
    pub fn failure(&self) -> Option<AlgorithmError> {
        self.failure.lock().clone()
    }

    /// Counter snapshot from the worker. Answered after a failure too.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Participant`] if the worker is gone.
    pub fn stats(&self) -> Result<AlgorithmStats, CollectorError> {
        self.round_trip(|reply| AlgorithmMessage::Stats { reply })
    }

    /// Resets the algorithm for a new run and clears any failure.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Participant`] if the worker is gone.
    pub fn reset(&self) -> Result<(), CollectorError> {
        self.round_trip(|reply| AlgorithmMessage::Reset { reply })
    }

    /// Queues a flush behind whatever the worker holds. A no-op for an
    /// algorithm that has already flushed.
    pub fn flush(&self) {
        if self
            .inbox
            .push(AlgorithmMessage::Payload(Payload::flush_sentinel()))
            .is_err()
        {
            debug!(algorithm = %self.name, "worker already stopped");
        }
    }

    /// Asks the worker to stop once it reaches this message.
    pub fn shutdown(&self) {
        if self.inbox.push(AlgorithmMessage::Shutdown).is_err() {
            debug!(algorithm = %self.name, "worker already stopped");
        }
    }

    fn send(&self, message: AlgorithmMessage) -> Result<(), CollectorError> {
        self.inbox
            .push(message)
            .map_err(|e| CollectorError::participant(&self.name, e))
    }

    fn check_failure(&self) -> Result<(), CollectorError> {
        match &*self.failure.lock() {
            Some(e) => Err(CollectorError::participant(&self.name, e)),
            None => Ok(()),
        }
    }

    fn round_trip<R>(
        &self,
        message: impl FnOnce(Producer<R>) -> AlgorithmMessage,
    ) -> Result<R, CollectorError> {
        let (reply, response) = channel(1);
        self.send(message(reply))?;
        response
            .recv()
            .map_err(|e| CollectorError::participant(&self.name, e))
    }

    /// Round trip used by the collector: refuses once the algorithm failed.
    fn ask<R>(
        &self,
        message: impl FnOnce(Producer<R>) -> AlgorithmMessage,
    ) -> Result<R, CollectorError> {
        self.check_failure()?;
        let value = self.round_trip(message)?;
        self.check_failure()?;
        Ok(value)
    }
}

impl Participant for AlgorithmHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_interval(&mut self, candidate: Interval) -> Result<Option<Interval>, CollectorError> {
        self.ask(|reply| AlgorithmMessage::GetInterval { candidate, reply })
    }

    fn release(&mut self, interval: Interval) -> Result<Vec<TriggerRequest>, CollectorError> {
        self.ask(|reply| AlgorithmMessage::Release { interval, reply })
    }

    fn progress(&mut self) -> Result<ParticipantProgress, CollectorError> {
        self.ask(|reply| AlgorithmMessage::Progress { reply })
    }

    fn recycle(&mut self) -> Result<usize, CollectorError> {
        // Allowed after a failure: shutdown frees what the algorithm holds.
        self.round_trip(|reply| AlgorithmMessage::Recycle { reply })
    }
}

impl std::fmt::Debug for AlgorithmHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmHandle")
            .field("name", &self.name)
            .field("queued", &self.queued())
            .field("failed", &self.failure.lock().is_some())
            .finish()
    }
}

/// A running algorithm worker.
#[derive(Debug)]
pub struct AlgorithmWorker {
    handle: AlgorithmHandle,
    thread: JoinHandle<AlgorithmStats>,
}

impl AlgorithmWorker {
    /// Moves `algorithm` onto a new thread named `trigger-alg-{name}`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SpawnFailed`] if the thread cannot start.
    pub fn spawn(
        algorithm: Box<dyn TriggerAlgorithm>,
        queue: &ChannelConfig,
    ) -> Result<Self, PipelineError> {
        let name = algorithm.name().to_string();
        let (inbox, messages) = channel_with_config(queue);
        let failure = Failure::default();

        let thread_failure = Arc::clone(&failure);
        let thread = thread::Builder::new()
            .name(format!("trigger-alg-{name}"))
            .spawn(move || run_algorithm(algorithm, &messages, &thread_failure))
            .map_err(|e| PipelineError::SpawnFailed {
                worker: name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            handle: AlgorithmHandle {
                name,
                inbox,
                failure,
            },
            thread,
        })
    }

    /// Handle for messaging the worker.
    #[must_use]
    pub fn handle(&self) -> &AlgorithmHandle {
        &self.handle
    }

    /// Sends `Shutdown` and waits for the thread, returning final counters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WorkerPanicked`] if the thread panicked.
    pub fn shutdown_and_join(self) -> Result<AlgorithmStats, PipelineError> {
        self.handle.shutdown();
        self.thread
            .join()
            .map_err(|_| PipelineError::WorkerPanicked(self.handle.name.clone()))
    }
}

fn reply<T>(algorithm: &str, reply: &Producer<T>, value: T) {
    if reply.push(value).is_err() {
        debug!(algorithm, "requester went away before the reply");
    }
}

fn run_algorithm(
    mut owned: Box<dyn TriggerAlgorithm>,
    messages: &Consumer<AlgorithmMessage>,
    failure: &Failure,
) -> AlgorithmStats {
    // Through the trait object: the box itself is also a `Participant`.
    let algorithm: &mut dyn TriggerAlgorithm = owned.as_mut();
    let name = algorithm.name().to_string();
    info!(algorithm = %name, key = %algorithm.key(), "algorithm worker started");

    while let Ok(message) = messages.recv() {
        match message {
            AlgorithmMessage::Payload(payload) => {
                if failure.lock().is_some() && !payload.is_flush() {
                    algorithm.core_mut().count_dropped(1);
                    continue;
                }
                if let Err(e) = algorithm.process(payload) {
                    error!(algorithm = %name, error = %e, "algorithm failed; dropping further input");
                    let mut failed = failure.lock();
                    if failed.is_none() {
                        *failed = Some(e);
                    }
                }
            }
            AlgorithmMessage::GetInterval { candidate, reply: to } => {
                reply(&name, &to, algorithm.get_interval(candidate));
            }
            AlgorithmMessage::Release { interval, reply: to } => {
                reply(&name, &to, algorithm.release(interval));
            }
            AlgorithmMessage::Progress { reply: to } => {
                reply(&name, &to, ParticipantProgress::from(algorithm.core()));
            }
            AlgorithmMessage::Stats { reply: to } => {
                let mut stats = algorithm.stats();
                stats.queued = messages.len();
                reply(&name, &to, stats);
            }
            AlgorithmMessage::Recycle { reply: to } => {
                reply(&name, &to, algorithm.recycle());
            }
            AlgorithmMessage::Reset { reply: to } => {
                algorithm.reset();
                if let Some(e) = failure.lock().take() {
                    warn!(algorithm = %name, error = %e, "clearing failure on run reset");
                }
                reply(&name, &to, ());
            }
            AlgorithmMessage::Shutdown => break,
        }
    }

    let stats = algorithm.stats();
    info!(
        algorithm = %name,
        inputs = stats.inputs,
        emitted = stats.emitted,
        released = stats.released,
        "algorithm worker stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use trigger_core::algorithm::{AlgorithmConfig, AlgorithmRegistry};
    use trigger_core::payload::{ChannelId, Hit, SourceId, TriggerKey};
    use trigger_core::time::DaqTime;

    fn smt() -> Box<dyn TriggerAlgorithm> {
        let config = AlgorithmConfig::new(
            "smt3",
            "SimpleMajorityTrigger",
            TriggerKey::new(0, 1, SourceId::IN_ICE_TRIGGER),
        )
        .with_param("threshold", 3)
        .with_param("timeWindow", 250);
        AlgorithmRegistry::with_builtins().create(&config).unwrap()
    }

    fn hit(ns: i64) -> AlgorithmMessage {
        AlgorithmMessage::Payload(Hit::spe(DaqTime::from_nanos(ns), ChannelId::new(1, 1)).into())
    }

    #[test]
    fn test_worker_answers_as_participant() {
        let worker = AlgorithmWorker::spawn(smt(), &ChannelConfig::default()).unwrap();
        let mut handle = worker.handle().clone();
        let inbox = handle.inbox();
        for ns in [0, 100, 200, 300] {
            inbox.push(hit(ns)).unwrap();
        }
        inbox
            .push(AlgorithmMessage::Payload(Payload::flush_sentinel()))
            .unwrap();

        let progress = handle.progress().unwrap();
        assert!(progress.flushed);
        assert_eq!(progress.cached, 1);

        let all = Interval::new(DaqTime::ZERO, DaqTime::MAX);
        assert!(handle.get_interval(all).unwrap().is_some());
        let released = handle.release(all).unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].last_time(), DaqTime::from_nanos(200));

        let stats = worker.shutdown_and_join().unwrap();
        assert_eq!(stats.inputs, 4);
        assert_eq!(stats.released, 1);
    }

    #[test]
    fn test_failure_reported_and_cleared_by_reset() {
        let worker = AlgorithmWorker::spawn(smt(), &ChannelConfig::default()).unwrap();
        let mut handle = worker.handle().clone();
        let inbox = handle.inbox();
        inbox.push(hit(500)).unwrap();
        inbox.push(hit(100)).unwrap();
        inbox.push(hit(600)).unwrap();

        assert!(matches!(
            handle.progress(),
            Err(CollectorError::Participant { .. })
        ));
        assert!(matches!(
            handle.failure(),
            Some(AlgorithmError::OutOfOrder { .. })
        ));
        assert_eq!(handle.stats().unwrap().dropped, 1);

        handle.reset().unwrap();
        assert!(handle.failure().is_none());
        assert!(!handle.progress().unwrap().flushed);
        worker.shutdown_and_join().unwrap();
    }

    #[test]
    fn test_recycle_and_stats_through_inbox() {
        let worker = AlgorithmWorker::spawn(smt(), &ChannelConfig::default()).unwrap();
        let mut handle = worker.handle().clone();
        let inbox = handle.inbox();
        for ns in [0, 100, 200, 5_000, 5_100, 5_200] {
            inbox.push(hit(ns)).unwrap();
        }
        inbox
            .push(AlgorithmMessage::Payload(Payload::flush_sentinel()))
            .unwrap();

        let window = Interval::new(DaqTime::ZERO, DaqTime::from_nanos(1_000));
        assert!(handle.get_interval(window).unwrap().is_some());
        assert_eq!(handle.release(window).unwrap().len(), 1);
        assert_eq!(handle.recycle().unwrap(), 1);
        assert_eq!(handle.progress().unwrap().cached, 0);

        let stats = handle.stats().unwrap();
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.released, 1);
        worker.shutdown_and_join().unwrap();
    }

    #[test]
    fn test_stopped_worker_is_an_error() {
        let worker = AlgorithmWorker::spawn(smt(), &ChannelConfig::default()).unwrap();
        let mut handle = worker.handle().clone();
        worker.shutdown_and_join().unwrap();
        assert!(handle.recycle().is_err());
    }
}
