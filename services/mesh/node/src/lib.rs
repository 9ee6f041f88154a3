//! Store-and-forward mesh node for mesh.
//!
//! A [`MeshNode`] owns the whole per-node state: learned routes, the outgoing
//! queue with its single in-flight frame, packets parked while a route is
//! discovered, and unicasts waiting for delivery confirmation. The owner
//! drives it by calling [`MeshNode::maintenance`] in a loop; the transport
//! feeds inbound datagrams and send completions through a [`ReceiveHandle`].
//!
//! ## Message flow
//!
//! - **Broadcast**: flooded with a TTL, relayed once per node
//! - **Unicast**: sent to the learned next hop, or straight to the target
//! - **UnicastWithConfirm**: as unicast, acknowledged end to end
//! - **SearchRequest / SearchResponse**: flooded to teach every relay a route
//!
//! The [`sim`] module provides an in-process medium for running several
//! nodes against each other.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
mod dispatch;
pub mod error;
pub mod handler;
pub mod node;
pub mod outgoing;
pub mod receive;
pub mod registry;
pub mod sim;
pub mod slot;
pub mod stats;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    NodeConfig, MAX_ATTEMPTS_RANGE, MAX_POOL_CAPACITY, ROUTE_DISCOVERY_RANGE_MS, TRANSMISSION_WAIT_RANGE_MS,
};
pub use error::{MeshError, TransportError};
pub use handler::MeshHandler;
pub use node::{MeshNode, FIRMWARE_VERSION};
pub use outgoing::SendState;
pub use receive::{Admission, ReceiveHandle};
pub use registry::{ConfirmationRegistry, PendingConfirmation, WaitingRegistry};
pub use sim::{FrameRecord, MeshEvent, RecordingHandler, SimMedium, SimTransport};
pub use slot::{IncomingBox, OutgoingBox, PacketPool, PacketSlot, WaitingBox};
pub use stats::NodeStats;
pub use transport::Transport;
