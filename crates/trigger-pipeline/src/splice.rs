//! Splicer worker: merges input strands and fans the ordered stream out to
//! every algorithm inbox.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use trigger_core::payload::Payload;
use trigger_core::splicer::{Splicer, SplicerError, SplicerHandle, SplicerStats, StrandTail};
use trigger_core::streaming::{Broadcast, ChannelConfig};
use trigger_core::time::Flushable;

use crate::worker::{AlgorithmHandle, AlgorithmMessage};
use crate::PipelineError;

/// One run's splicer thread and the handle inputs attach through.
///
/// The splicer stays open with every input closed until [`close`](Self::close)
/// seals it, so inputs may be added at any point of the run.
pub(crate) struct SpliceRun {
    handle: SplicerHandle<Payload>,
    abort: Arc<AtomicBool>,
    thread: JoinHandle<Result<SplicerStats, PipelineError>>,
}

impl SpliceRun {
    pub(crate) fn spawn(
        strands: &ChannelConfig,
        algorithms: &[AlgorithmHandle],
        timeout: Duration,
        run: u64,
    ) -> Result<Self, PipelineError> {
        let splicer = Splicer::with_config(strands.clone()).until_sealed();
        let handle = splicer.handle();
        let mut fanout = Broadcast::new();
        for algorithm in algorithms {
            fanout.subscribe(algorithm.name(), algorithm.inbox());
        }
        let abort = Arc::new(AtomicBool::new(false));

        let thread_abort = Arc::clone(&abort);
        let thread = thread::Builder::new()
            .name(format!("trigger-splicer-{run}"))
            .spawn(move || run_splicer(splicer, fanout, timeout, &thread_abort))
            .map_err(|e| PipelineError::SpawnFailed {
                worker: "splicer".into(),
                message: e.to_string(),
            })?;

        Ok(Self {
            handle,
            abort,
            thread,
        })
    }

    /// Attaches a new input strand.
    pub(crate) fn add_strand(&self) -> Result<StrandTail<Payload>, SplicerError> {
        self.handle.add_strand()
    }

    /// Refuses further inputs; the merge ends once the open ones close.
    pub(crate) fn close(&self) {
        self.handle.seal();
    }

    /// Ends the merge at its next wait, whatever is still open.
    pub(crate) fn abort(&self) {
        self.abort.store(true, Ordering::Release);
        self.close();
    }

    pub(crate) fn join(self) -> Result<SplicerStats, PipelineError> {
        self.thread
            .join()
            .map_err(|_| PipelineError::WorkerPanicked("splicer".into()))?
    }
}

fn flush(fanout: &mut Broadcast<AlgorithmMessage>) -> Result<(), PipelineError> {
    fanout.broadcast(&AlgorithmMessage::Payload(Payload::flush_sentinel()))?;
    Ok(())
}

fn run_splicer(
    mut splicer: Splicer<Payload>,
    mut fanout: Broadcast<AlgorithmMessage>,
    timeout: Duration,
    abort: &AtomicBool,
) -> Result<SplicerStats, PipelineError> {
    info!(algorithms = fanout.subscriber_count(), "splicer worker started");
    loop {
        if abort.load(Ordering::Acquire) {
            let stats = splicer.stats();
            let open = splicer.stop();
            warn!(strands_open = open, "splicer aborted; flushing algorithms");
            flush(&mut fanout)?;
            return Ok(stats);
        }
        let next = match splicer.next_timeout(timeout) {
            Ok(next) => next,
            Err(e @ SplicerError::LateStrand { .. }) => {
                warn!(error = %e, "late strand item dropped");
                continue;
            }
            Err(e) => {
                splicer.stop();
                flush(&mut fanout)?;
                return Err(e.into());
            }
        };
        let Some(payload) = next else {
            continue;
        };
        let last = payload.is_flush();
        if let Err(e) = fanout.broadcast(&AlgorithmMessage::Payload(payload)) {
            let open = splicer.stop();
            error!(error = %e, strands_open = open, "algorithm inbox refused the merged stream");
            return Err(e.into());
        }
        if last {
            debug!("every input closed after seal");
            break;
        }
    }
    let stats = splicer.stats();
    info!(
        items = stats.items_emitted,
        strands = stats.strands_added,
        rejected = stats.items_rejected,
        "splicer worker finished"
    );
    Ok(stats)
}
