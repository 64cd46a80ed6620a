//! The running pipeline.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use trigger_core::algorithm::{AlgorithmError, AlgorithmRegistry, AlgorithmStats};
use trigger_core::alloc::BufferPool;
use trigger_core::collector::CollectorStats;
use trigger_core::payload::TriggerRequest;
use trigger_core::splicer::SplicerStats;
use trigger_core::streaming::{channel_with_config, Consumer, RecvError};

use crate::collect::CollectorRun;
use crate::io::{InputHandle, RequestWriter};
use crate::splice::SpliceRun;
use crate::worker::{AlgorithmHandle, AlgorithmWorker};
use crate::{PipelineConfig, PipelineError};

/// Buffers the shared pool keeps idle.
const POOL_RETAINED: usize = 64;

/// Initial capacity of pooled buffers, in bytes.
const POOL_BUFFER_CAPACITY: usize = 16 * 1024;

/// Counters for one completed run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Run ordinal, starting at 0.
    pub run: u64,
    /// Merge counters.
    pub splicer: SplicerStats,
    /// Release counters, cumulative across runs.
    pub collector: CollectorStats,
    /// Per-algorithm counters, cumulative across runs.
    pub algorithms: Vec<AlgorithmStats>,
    /// Released requests the output queue refused, cumulative.
    pub discarded: u64,
}

/// A trigger pipeline running on worker threads.
///
/// ```text
///  InputHandle ─┐                      ┌─▶ algorithm worker ─┐
///  InputHandle ─┼─▶ splicer worker ────┼─▶ algorithm worker ─┼─▶ collector worker ─▶ output
///  InputHandle ─┘    (ordered merge)   └─▶ algorithm worker ─┘   (negotiate, release)
/// ```
///
/// Released requests arrive on the queue from
/// [`take_output`](Self::take_output) in global time order. Read it from
/// another thread while the run is in progress: a full output queue blocks
/// the collector.
pub struct Pipeline {
    config: PipelineConfig,
    workers: Vec<AlgorithmWorker>,
    splice: Option<SpliceRun>,
    collector: Option<CollectorRun>,
    output: Option<Consumer<TriggerRequest>>,
    open_inputs: Arc<AtomicUsize>,
    discarded: Arc<AtomicU64>,
    pool: BufferPool,
    run: u64,
}

impl Pipeline {
    /// Starts a pipeline with the built-in algorithms.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for an invalid configuration, or
    /// [`PipelineError::SpawnFailed`] if a worker cannot start.
    pub fn start(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::with_registry(config, &AlgorithmRegistry::with_builtins())
    }

    /// Starts a pipeline creating algorithms from `registry`.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub fn with_registry(
        config: PipelineConfig,
        registry: &AlgorithmRegistry,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        // Build every algorithm before starting any thread.
        let algorithms = config
            .algorithms
            .iter()
            .map(|algorithm| registry.create(algorithm))
            .collect::<Result<Vec<_>, _>>()?;

        let mut workers = Vec::with_capacity(algorithms.len());
        for algorithm in algorithms {
            match AlgorithmWorker::spawn(algorithm, &config.algorithm_queue) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    stop_workers(workers);
                    return Err(e);
                }
            }
        }
        let handles: Vec<AlgorithmHandle> = workers.iter().map(|w| w.handle().clone()).collect();

        let (output, consumer) = channel_with_config(&config.output_channel);
        let discarded = Arc::new(AtomicU64::new(0));
        let collector = match CollectorRun::spawn(
            config.collector.clone(),
            handles.clone(),
            output,
            Arc::clone(&discarded),
        ) {
            Ok(collector) => collector,
            Err(e) => {
                stop_workers(workers);
                return Err(e);
            }
        };
        let splice = match SpliceRun::spawn(
            &config.strand_channel,
            &handles,
            config.splice_timeout(),
            0,
        ) {
            Ok(splice) => splice,
            Err(e) => {
                for handle in &handles {
                    handle.flush();
                }
                drop(collector.finish());
                stop_workers(workers);
                return Err(e);
            }
        };

        info!(
            algorithms = workers.len(),
            merge = config.collector.merge_overlapping,
            "trigger pipeline started"
        );
        Ok(Self {
            config,
            workers,
            splice: Some(splice),
            collector: Some(collector),
            output: Some(consumer),
            open_inputs: Arc::new(AtomicUsize::new(0)),
            discarded,
            pool: BufferPool::new(POOL_RETAINED, POOL_BUFFER_CAPACITY),
            run: 0,
        })
    }

    /// The configuration the pipeline was started with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current run ordinal.
    #[must_use]
    pub fn run(&self) -> u64 {
        self.run
    }

    /// Opens a new input channel. Inputs may be added at any point of the
    /// run, including after every earlier input closed; items earlier than
    /// what was already merged are dropped and counted.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Shutdown`] without a running merge, or
    /// [`PipelineError::Splicer`] if the merge no longer takes inputs.
    pub fn add_input(&self) -> Result<InputHandle, PipelineError> {
        let splice = self.splice.as_ref().ok_or(PipelineError::Shutdown)?;
        Ok(InputHandle::new(
            splice.add_strand()?,
            Arc::clone(&self.open_inputs),
        ))
    }

    /// Inputs opened and not yet closed or dropped.
    #[must_use]
    pub fn open_inputs(&self) -> usize {
        self.open_inputs.load(Ordering::Acquire)
    }

    /// Takes the queue of released requests. Returns `None` after the
    /// first call.
    pub fn take_output(&mut self) -> Option<Consumer<TriggerRequest>> {
        self.output.take()
    }

    /// The pool input buffers and encoded output share.
    #[must_use]
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    /// A writer encoding requests into buffers from the shared pool.
    #[must_use]
    pub fn request_writer(&self) -> RequestWriter {
        RequestWriter::new(self.pool.clone())
    }

    /// Released requests the output queue refused so far.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Counter snapshots from every algorithm worker.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Collector`] if a worker is gone.
    pub fn algorithm_stats(&self) -> Result<Vec<AlgorithmStats>, PipelineError> {
        self.workers
            .iter()
            .map(|worker| worker.handle().stats().map_err(PipelineError::from))
            .collect()
    }

    /// Ends the current run and starts the next one without restarting the
    /// algorithm workers.
    ///
    /// Everything the run produced is released first. Request uids,
    /// watermarks and caches then go back to their initial state; counters
    /// keep accumulating. Inputs opened afterwards feed the new run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RunInProgress`] while any input is open.
    /// Any other error leaves the pipeline able only to
    /// [`finish`](Self::finish).
    pub fn reset_run(&mut self) -> Result<RunReport, PipelineError> {
        if self.open_inputs() > 0 {
            return Err(PipelineError::RunInProgress);
        }
        let splice = self.splice.take().ok_or(PipelineError::Shutdown)?;
        splice.close();
        let splicer = splice.join()?;

        let collector = self.collector.as_ref().ok_or(PipelineError::Shutdown)?;
        let stats = match collector.reset() {
            Ok(stats) => stats,
            Err(RecvError::Disconnected | RecvError::Timeout) => {
                let failed = self.collector.take().map(CollectorRun::finish);
                return Err(match failed {
                    Some(Err(e)) => e,
                    _ => PipelineError::Shutdown,
                });
            }
        };

        let report = RunReport {
            run: self.run,
            splicer,
            collector: stats,
            algorithms: self.algorithm_stats()?,
            discarded: self.discarded(),
        };
        self.run += 1;
        let handles: Vec<AlgorithmHandle> =
            self.workers.iter().map(|w| w.handle().clone()).collect();
        self.splice = Some(SpliceRun::spawn(
            &self.config.strand_channel,
            &handles,
            self.config.splice_timeout(),
            self.run,
        )?);
        info!(run = self.run, "run reset");
        Ok(report)
    }

    /// Waits for every input to close, releases everything and stops the
    /// workers.
    ///
    /// # Errors
    ///
    /// Returns the first error any worker hit: a splicer error, the first
    /// algorithm failure, then a collector error.
    pub fn finish(mut self) -> Result<RunReport, PipelineError> {
        self.wind_down(false)
    }

    /// Like [`finish`](Self::finish) but does not wait for open inputs;
    /// their unmerged items are lost.
    ///
    /// # Errors
    ///
    /// See [`finish`](Self::finish).
    pub fn shutdown(mut self) -> Result<RunReport, PipelineError> {
        self.wind_down(true)
    }

    fn wind_down(&mut self, abort: bool) -> Result<RunReport, PipelineError> {
        if self.output.take().is_some() {
            warn!("output never taken; released requests are discarded");
        }

        let splicer = match self.splice.take() {
            Some(splice) => {
                if abort {
                    splice.abort();
                } else {
                    splice.close();
                }
                splice.join()
            }
            None => Ok(SplicerStats::default()),
        };
        // The collector only finishes once every algorithm has flushed.
        for worker in &self.workers {
            worker.handle().flush();
        }
        let collector = match self.collector.take() {
            Some(collector) => collector.finish(),
            None => Ok(CollectorStats::default()),
        };

        let failure: Option<AlgorithmError> =
            self.workers.iter().find_map(|w| w.handle().failure());
        let mut algorithms = Vec::with_capacity(self.workers.len());
        let mut joined = Ok(());
        for worker in self.workers.drain(..) {
            match worker.shutdown_and_join() {
                Ok(stats) => algorithms.push(stats),
                Err(e) => {
                    error!(error = %e, "algorithm worker lost");
                    if joined.is_ok() {
                        joined = Err(e);
                    }
                }
            }
        }

        let splicer = splicer?;
        if let Some(e) = failure {
            return Err(e.into());
        }
        let collector = collector?;
        joined?;

        let report = RunReport {
            run: self.run,
            splicer,
            collector,
            algorithms,
            discarded: self.discarded(),
        };
        info!(
            run = report.run,
            released = report.collector.released,
            discarded = report.discarded,
            "trigger pipeline stopped"
        );
        Ok(report)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.splice.is_some() || self.collector.is_some() || !self.workers.is_empty() {
            if let Err(e) = self.wind_down(true) {
                warn!(error = %e, "pipeline dropped with an error");
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("run", &self.run)
            .field("algorithms", &self.workers.len())
            .field("open_inputs", &self.open_inputs())
            .field("output_taken", &self.output.is_none())
            .field("discarded", &self.discarded())
            .finish_non_exhaustive()
    }
}

fn stop_workers(workers: Vec<AlgorithmWorker>) {
    for worker in workers {
        if let Err(e) = worker.shutdown_and_join() {
            warn!(error = %e, "worker lost while aborting start");
        }
    }
}
