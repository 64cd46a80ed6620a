//! Queue errors.
//!
//! Push errors name what the queue was doing when it refused; `try_push`
//! hands the refused item back so a producer can retry or count it.

/// A blocking push that did not enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamingError {
    /// The queue is at capacity and rejects rather than waits.
    #[error("queue full at {capacity} items")]
    ChannelFull {
        /// Queue capacity.
        capacity: usize,
    },

    /// The consumer has gone away.
    #[error("queue consumer has gone away")]
    ChannelClosed,
}

/// A non-blocking push that did not enqueue. Carries the item.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TryPushError<T> {
    /// No room right now.
    #[error("queue full")]
    Full(T),
    /// The consumer has gone away.
    #[error("queue consumer has gone away")]
    Closed(T),
}

impl<T> TryPushError<T> {
    /// Returns true if the queue was full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Returns true if the consumer was gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// The item that was not pushed.
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }
}

/// A receive that produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecvError {
    /// Every producer dropped and the queue is drained.
    #[error("every producer has gone away")]
    Disconnected,

    /// Nothing arrived within the timeout.
    #[error("nothing received before the timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{ChannelId, Hit};
    use crate::time::DaqTime;

    #[test]
    fn test_full_reports_capacity() {
        let err = StreamingError::ChannelFull { capacity: 4096 };
        assert_eq!(err.to_string(), "queue full at 4096 items");
    }

    #[test]
    fn test_try_push_hands_item_back() {
        let hit = Hit::spe(DaqTime::new(7), ChannelId::new(21, 30));
        let err = TryPushError::Full(hit);
        assert!(err.is_full());
        assert!(!err.is_closed());
        assert_eq!(err.into_inner().time, DaqTime::new(7));

        let err = TryPushError::Closed(hit);
        assert!(err.is_closed());
        assert_eq!(err.to_string(), "queue consumer has gone away");
    }
}
