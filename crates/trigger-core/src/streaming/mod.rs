//! # Streaming Primitives
//!
//! Bounded in-memory queues connecting the trigger workers.
//!
//! - [`channel`]: blocking `Producer`/`Consumer` queue; cloning the producer
//!   turns it into a multi-producer queue
//! - [`broadcast`]: fan-out of one ordered stream to many queues
//! - [`config`]: queue depth and backpressure
//! - [`error`]: push and receive errors
//!
//! ## Architecture
//!
//! ```text
//! strand tails ──▶ splicer ──▶ Broadcast ──┬──▶ algorithm inbox ──▶ worker
//!                                          ├──▶ algorithm inbox ──▶ worker
//!                                          └──▶ ...
//! ```

pub mod broadcast;
pub mod channel;
pub mod config;
pub mod error;

pub use broadcast::Broadcast;
pub use channel::{channel, channel_with_config, Consumer, Producer};
pub use config::{BackpressureStrategy, ChannelConfig, ChannelStats};
pub use error::{RecvError, StreamingError, TryPushError};
