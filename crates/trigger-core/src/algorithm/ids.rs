//! Id generators, injected at construction.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::payload::FLUSH_UID;

/// Per-algorithm request uid sequence. Reset at run boundaries.
#[derive(Debug, Default, Clone)]
pub struct RequestIdGenerator {
    next: u32,
}

impl RequestIdGenerator {
    /// Creates a generator starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next uid. Never returns [`FLUSH_UID`].
    pub fn next_uid(&mut self) -> u32 {
        let uid = self.next;
        self.next = self.next.wrapping_add(1);
        if self.next == FLUSH_UID {
            self.next = 0;
        }
        uid
    }

    /// Uid the next call will return.
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Restarts the sequence at zero.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Shared sequence of algorithm instance ordinals.
///
/// Cloned into every place that creates algorithms; clones share the
/// sequence.
#[derive(Debug, Default, Clone)]
pub struct InstanceIdGenerator {
    next: Arc<AtomicU32>,
}

impl InstanceIdGenerator {
    /// Creates a generator starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next ordinal.
    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_reset() {
        let mut ids = RequestIdGenerator::new();
        assert_eq!(ids.next_uid(), 0);
        assert_eq!(ids.next_uid(), 1);
        ids.reset();
        assert_eq!(ids.next_uid(), 0);
    }

    #[test]
    fn test_request_ids_skip_flush_uid() {
        let mut ids = RequestIdGenerator {
            next: FLUSH_UID - 1,
        };
        assert_eq!(ids.next_uid(), FLUSH_UID - 1);
        assert_eq!(ids.peek(), 0);
    }

    #[test]
    fn test_instance_ids_shared_by_clones() {
        let ids = InstanceIdGenerator::new();
        let other = ids.clone();
        assert_eq!(ids.next_id(), 0);
        assert_eq!(other.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
    }
}
