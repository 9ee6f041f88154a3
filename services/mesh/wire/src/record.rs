//! Per-hop wrappers around a [`Packet`].
//!
//! A packet on its way out knows the node it is physically sent to next; a
//! packet that just arrived knows the node that physically transmitted it.
//! Neither hop address is part of the datagram.

use crate::node_id::{NodeId, NODE_ID_LEN};
use crate::packet::{Packet, PACKET_SIZE};

/// Encoded upper bound of an [`OutgoingRecord`]
pub const OUTGOING_RECORD_LEN: usize = NODE_ID_LEN + PACKET_SIZE;

/// Encoded upper bound of an [`IncomingRecord`]
pub const INCOMING_RECORD_LEN: usize = NODE_ID_LEN + PACKET_SIZE;

/// Encoded upper bound of a [`WaitingRecord`]
pub const WAITING_RECORD_LEN: usize = 8 + NODE_ID_LEN + PACKET_SIZE;

/// Packet queued for transmission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingRecord {
    /// Node the datagram is physically sent to
    pub next_hop: NodeId,
    /// The packet itself
    pub packet: Packet,
}

impl OutgoingRecord {
    /// Wrap a packet for transmission to `next_hop`
    pub fn new(next_hop: NodeId, packet: Packet) -> Self {
        Self { next_hop, packet }
    }

    /// Whether this record was originated by `local`
    pub fn originated_by(&self, local: NodeId) -> bool {
        self.packet.original_sender == local
    }
}

/// Packet received from the transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingRecord {
    /// Node that physically transmitted this hop
    pub immediate_sender: NodeId,
    /// The packet itself
    pub packet: Packet,
}

impl IncomingRecord {
    /// Wrap a freshly received packet
    pub fn new(immediate_sender: NodeId, packet: Packet) -> Self {
        Self {
            immediate_sender,
            packet,
        }
    }
}

/// Packet parked until a route to its destination is discovered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitingRecord {
    /// Time the record was parked, in clock milliseconds
    pub enqueued_at_ms: u64,
    /// Broadcast until a route resolves, then the discovered next hop
    pub next_hop: NodeId,
    /// The packet itself
    pub packet: Packet,
}

impl WaitingRecord {
    /// Park an outgoing record that ran out of attempts
    pub fn park(record: &OutgoingRecord, now_ms: u64) -> Self {
        Self {
            enqueued_at_ms: now_ms,
            next_hop: NodeId::BROADCAST,
            packet: record.packet.clone(),
        }
    }

    /// Milliseconds spent waiting so far
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.enqueued_at_ms)
    }
}
