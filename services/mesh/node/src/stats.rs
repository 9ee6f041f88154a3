//! Node counters

use serde::{Deserialize, Serialize};

/// Snapshot of a node's traffic counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    /// Frames handed to the transport
    pub frames_sent: u64,
    /// Transmissions reported as failed or never completed
    pub send_failures: u64,
    /// Frames given up on after exhausting every attempt
    pub send_exhausted: u64,
    /// Datagrams admitted into the incoming queue
    pub received: u64,
    /// Payloads handed to the application
    pub delivered: u64,
    /// Packets re-queued toward another node
    pub forwarded: u64,
    /// Route discovery floods originated here
    pub search_requests: u64,
    /// Confirmed deliveries
    pub confirmed: u64,
    /// Deliveries reported as failed
    pub unconfirmed: u64,
    /// Datagrams dropped for size, network label, or own origin
    pub dropped_foreign: u64,
    /// Datagrams dropped as replays
    pub dropped_duplicate: u64,
    /// Datagrams dropped because the receive path was busy
    pub dropped_busy: u64,
    /// Packets dropped because no buffer or waiting slot was free
    pub dropped_no_buffer: u64,
    /// Routes to destinations currently known
    pub routes: usize,
    /// Sends that found a learned route
    pub route_hits: u64,
    /// Sends that fell back to the destination itself
    pub route_misses: u64,
    /// Routes inserted or rewritten
    pub routes_learned: u64,
    /// Routes dropped after undeliverable traffic
    pub routes_invalidated: u64,
}
