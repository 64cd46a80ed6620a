//! Splicer errors.

use crate::time::DaqTime;

/// Errors raised by strand tails and the splicer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplicerError {
    /// An item earlier than the previous item on the same strand.
    #[error("strand {strand}: item at {time} is earlier than previous item at {previous}")]
    OutOfOrder {
        /// Strand index.
        strand: usize,
        /// Offending time.
        time: DaqTime,
        /// Time of the strand's previous item.
        previous: DaqTime,
    },

    /// A strand added at runtime whose item precedes what was already emitted.
    #[error("strand {strand} joined late: item at {time} is before last emitted {last_emitted}")]
    LateStrand {
        /// Strand index.
        strand: usize,
        /// Offending time.
        time: DaqTime,
        /// Time of the last item the splicer emitted.
        last_emitted: DaqTime,
    },

    /// Push to a strand that was already closed.
    #[error("strand {strand} is closed")]
    StrandClosed {
        /// Strand index.
        strand: usize,
    },

    /// The splicer consuming this strand has gone away.
    #[error("splicer for strand {strand} has shut down")]
    Disconnected {
        /// Strand index.
        strand: usize,
    },

    /// The splicer is sealed or finished and takes no more strands.
    #[error("splicer is sealed; no strands can be added")]
    Sealed,
}
