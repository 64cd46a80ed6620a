//! Collector worker: polls the negotiation and forwards released requests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use trigger_core::collector::{Collector, CollectorConfig, CollectorStats};
use trigger_core::payload::TriggerRequest;
use trigger_core::streaming::{channel, Consumer, Producer, RecvError};

use crate::worker::AlgorithmHandle;
use crate::PipelineError;

/// Commands from the facade.
#[derive(Debug)]
pub(crate) enum CollectorCommand {
    /// Release everything left, reset every algorithm, then reply.
    Reset {
        reply: Producer<CollectorStats>,
    },
    /// Release everything left and stop.
    Finish,
}

/// The collector thread and its command queue.
pub(crate) struct CollectorRun {
    control: Producer<CollectorCommand>,
    thread: JoinHandle<Result<CollectorStats, PipelineError>>,
}

impl CollectorRun {
    pub(crate) fn spawn(
        config: CollectorConfig,
        algorithms: Vec<AlgorithmHandle>,
        output: Producer<TriggerRequest>,
        discarded: Arc<AtomicU64>,
    ) -> Result<Self, PipelineError> {
        let poll_interval = config.poll_interval();
        let collector = Collector::new(config, algorithms)?;
        let (control, commands) = channel(4);

        let mut worker = CollectorWorker {
            collector,
            output,
            discarded,
            poll_interval,
            output_closed: false,
        };
        let thread = thread::Builder::new()
            .name("trigger-collector".into())
            .spawn(move || worker.run(&commands))
            .map_err(|e| PipelineError::SpawnFailed {
                worker: "collector".into(),
                message: e.to_string(),
            })?;

        Ok(Self { control, thread })
    }

    /// Drains the run, resets every algorithm and returns the counters.
    ///
    /// Every input must be closed and the splicer finished first.
    pub(crate) fn reset(&self) -> Result<CollectorStats, RecvError> {
        let (reply, response) = channel(1);
        if self.control.push(CollectorCommand::Reset { reply }).is_err() {
            return Err(RecvError::Disconnected);
        }
        response.recv()
    }

    pub(crate) fn finish(self) -> Result<CollectorStats, PipelineError> {
        if self.control.push(CollectorCommand::Finish).is_err() {
            debug!("collector already stopped");
        }
        self.thread
            .join()
            .map_err(|_| PipelineError::WorkerPanicked("collector".into()))?
    }
}

struct CollectorWorker {
    collector: Collector<AlgorithmHandle>,
    output: Producer<TriggerRequest>,
    discarded: Arc<AtomicU64>,
    poll_interval: Duration,
    output_closed: bool,
}

impl CollectorWorker {
    fn run(&mut self, commands: &Consumer<CollectorCommand>) -> Result<CollectorStats, PipelineError> {
        info!(
            participants = self.collector.participants().len(),
            "collector worker started"
        );
        loop {
            self.forward()?;
            match commands.recv_timeout(self.poll_interval) {
                Ok(CollectorCommand::Finish) | Err(RecvError::Disconnected) => {
                    self.drain_run()?;
                    let stats = self.collector.shutdown()?;
                    info!(
                        released = stats.released,
                        discarded = self.discarded.load(Ordering::Relaxed),
                        "collector worker finished"
                    );
                    return Ok(stats);
                }
                Ok(CollectorCommand::Reset { reply }) => {
                    self.drain_run()?;
                    let stats = self.collector.shutdown()?;
                    for algorithm in self.collector.participants() {
                        algorithm.reset()?;
                    }
                    self.collector.reset();
                    info!(released = stats.released, "run reset");
                    if reply.push(stats).is_err() {
                        debug!("reset requester went away");
                    }
                }
                Err(RecvError::Timeout) => {}
            }
        }
    }

    /// Polls until the run is fully released.
    fn drain_run(&mut self) -> Result<(), PipelineError> {
        loop {
            self.forward()?;
            if self.collector.is_finished() {
                return Ok(());
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Releases whatever can be finalized now and hands it downstream.
    fn forward(&mut self) -> Result<usize, PipelineError> {
        let output = &self.output;
        let discarded = &self.discarded;
        let output_closed = &mut self.output_closed;
        let forwarded = self.collector.drain(|batch| {
            for request in batch {
                if output.push(request).is_err() {
                    discarded.fetch_add(1, Ordering::Relaxed);
                    if !*output_closed {
                        warn!("output closed or full; discarding released requests");
                        *output_closed = true;
                    }
                }
            }
        })?;
        Ok(forwarded)
    }
}
