//! Channel factory for the simulator.
//!
//! Three transports are provided:
//! - [`pipe`]: a pair of connected duplex endpoints, each owned by one worker.
//! - [`MessageQueue`]: a FIFO shared by any number of senders and receivers.
//! - [`SegmentStore`]: named fixed-size byte regions backed by memory-mapped
//!   files. Segments carry no synchronization at all.

mod error;
mod message;
mod pipe;
mod queue;
mod segment;

pub use error::ChannelError;
pub use message::Message;
pub use pipe::{PipeEndpoint, pipe};
pub use queue::MessageQueue;
pub use segment::{SegmentHandle, SegmentStore, SharedSegment};
