//! Fixed-size packet layout, record kinds, node identifiers, and payload
//! obfuscation for mesh.
//!
//! Every datagram exchanged between nodes is exactly [`PACKET_SIZE`] bytes,
//! regardless of how much payload it carries. Nodes of the same build must be
//! able to round-trip these bytes without loss, so the layout below is frozen.
//!
//! ## Wire Format
//!
//! ```text
//! +------------------+-------------------------------------------+
//! | u8  message_type | Broadcast=1 .. SearchResponse=6           |
//! +------------------+-------------------------------------------+
//! | u8  message_size | payload length (0..200)                   |
//! +------------------+-------------------------------------------+
//! | u16 message_id   | little-endian, random per originator      |
//! +------------------+-------------------------------------------+
//! | [u8; 20] net     | network label, zero padded, empty = any   |
//! +------------------+-------------------------------------------+
//! | [u8; 6] target   | original (end-to-end) target              |
//! +------------------+-------------------------------------------+
//! | [u8; 6] sender   | original (end-to-end) sender              |
//! +------------------+-------------------------------------------+
//! | u8  ttl          | remaining hop budget                      |
//! +------------------+-------------------------------------------+
//! | [u8; 200] body   | payload, zero padded past message_size    |
//! +------------------+-------------------------------------------+
//! ```
//!
//! The per-hop fields (next hop on the way out, immediate sender on the way
//! in) are never transmitted; they live in the [`record`] wrappers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cipher;
pub mod error;
pub mod node_id;
pub mod packet;
pub mod record;

// Re-export main types
pub use cipher::{Obfuscator, MAX_KEY_LEN};
pub use error::WireError;
pub use node_id::{NetName, NodeId, NET_NAME_SIZE, NODE_ID_LEN};
pub use packet::{MessageType, Packet, DEFAULT_TTL, MAX_PAYLOAD, PACKET_SIZE};
pub use record::{
    IncomingRecord, OutgoingRecord, WaitingRecord, INCOMING_RECORD_LEN, OUTGOING_RECORD_LEN,
    WAITING_RECORD_LEN,
};
