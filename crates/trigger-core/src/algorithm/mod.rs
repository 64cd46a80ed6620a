//! # Algorithm Module
//!
//! Trigger algorithms and the machinery they share.
//!
//! Every algorithm is an independent struct implementing
//! [`TriggerAlgorithm`]. It composes an [`AlgorithmCore`] (identity, request
//! uid sequence, request cache, watermark, counters) with the engine it
//! needs:
//!
//! | Algorithm | Engine | Input |
//! |---|---|---|
//! | [`SimpleMajorityTrigger`] | sliding window, multiplicity | hits |
//! | [`CalibrationTrigger`] | sliding window, hit-type filter | hits |
//! | [`ClusterTrigger`] | sliding window, spatial cluster | hits |
//! | [`MinBiasTrigger`] | prescaler | hits |
//! | [`FixedRateTrigger`] | fixed-period clock | any |
//! | [`CoincidenceTrigger`] | pending bag, N-of-M | requests |
//! | [`PassThroughTrigger`] | pending bag | requests |
//! | [`VetoTrigger`] | pending bag, exclusion set | requests |
//!
//! Algorithms are created by name from an [`AlgorithmConfig`] through the
//! [`AlgorithmRegistry`].

mod base;
mod cache;
mod calibration;
mod cluster;
mod combine;
mod config;
mod error;
mod fixed_rate;
mod ids;
mod min_bias;
mod readout;
mod registry;
mod simple_majority;

pub use self::base::{AlgorithmCore, AlgorithmStats};
pub use self::cache::RequestCache;
pub use self::calibration::CalibrationTrigger;
pub use self::cluster::ClusterTrigger;
pub use self::combine::{CoincidenceTrigger, PassThroughTrigger, VetoTrigger};
pub use self::config::{AlgorithmConfig, ParamKind, ParamSpec};
pub use self::error::{AlgorithmError, ConfigError};
pub use self::fixed_rate::FixedRateTrigger;
pub use self::ids::{InstanceIdGenerator, RequestIdGenerator};
pub use self::min_bias::MinBiasTrigger;
pub use self::readout::{build_readout, ReadoutTemplate};
pub use self::registry::{AlgorithmFactory, AlgorithmInfo, AlgorithmRegistry};
pub use self::simple_majority::SimpleMajorityTrigger;

use crate::payload::{Payload, TriggerKey, TriggerRequest};
use crate::time::{DaqTime, Flushable, Interval, Timed};

/// A stateful trigger algorithm consuming the time-ordered stream.
///
/// Implementors provide the payload handling; the provided methods route
/// the flush, answer the collector and handle run resets through the
/// [`AlgorithmCore`].
pub trait TriggerAlgorithm: Send {
    /// Shared bookkeeping.
    fn core(&self) -> &AlgorithmCore;

    /// Shared bookkeeping, mutably.
    fn core_mut(&mut self) -> &mut AlgorithmCore;

    /// Handles one payload that is not the flush sentinel.
    ///
    /// # Errors
    ///
    /// Returns an [`AlgorithmError`] for ordering violations, unsupported
    /// payloads or failed emission.
    fn on_payload(&mut self, payload: Payload) -> Result<(), AlgorithmError>;

    /// Makes final decisions at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an [`AlgorithmError`] if a final emission fails.
    fn on_flush(&mut self) -> Result<(), AlgorithmError>;

    /// Clears algorithm-specific state for a new run.
    fn reset_state(&mut self);

    /// Instance name.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Identity stamped on emitted requests.
    fn key(&self) -> TriggerKey {
        self.core().key()
    }

    /// Processes one payload from the ordered stream.
    ///
    /// The flush sentinel finalizes the algorithm and moves its watermark to
    /// the flush time. Payloads after the flush are ordering violations.
    ///
    /// # Errors
    ///
    /// Returns an [`AlgorithmError`] from the algorithm.
    fn process(&mut self, payload: Payload) -> Result<(), AlgorithmError> {
        if payload.is_flush() {
            if !self.core().is_flushed() {
                self.on_flush()?;
                self.core_mut().finish();
            }
            return Ok(());
        }
        if self.core().is_flushed() {
            return Err(self.core().out_of_order(payload.time(), DaqTime::MAX));
        }
        self.core_mut().count_input();
        self.on_payload(payload)
    }

    /// Current watermark.
    fn watermark(&self) -> DaqTime {
        self.core().watermark()
    }

    /// Answers the collector's interval query.
    fn get_interval(&self, candidate: Interval) -> Option<Interval> {
        self.core().get_interval(candidate)
    }

    /// Removes and returns cached requests inside `interval`.
    fn release(&mut self, interval: Interval) -> Vec<TriggerRequest> {
        self.core_mut().release(interval)
    }

    /// Frees every cached request; returns how many there were.
    fn recycle(&mut self) -> usize {
        self.core_mut().recycle()
    }

    /// Run-boundary reset: state, ids and watermark go back to the start.
    fn reset(&mut self) {
        self.reset_state();
        self.core_mut().reset();
    }

    /// Counter snapshot.
    fn stats(&self) -> AlgorithmStats {
        self.core().stats()
    }

    /// Returns true once the flush has been processed.
    fn is_flushed(&self) -> bool {
        self.core().is_flushed()
    }
}
