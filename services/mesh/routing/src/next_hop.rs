//! Route entries

use mesh_wire::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A learned route: packets for `destination` are handed to `next_hop`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteEntry {
    /// End-to-end destination
    pub destination: NodeId,
    /// Neighbour the packet is physically sent to
    pub next_hop: NodeId,
}

impl RouteEntry {
    /// Create a new route entry
    pub fn new(destination: NodeId, next_hop: NodeId) -> Self {
        Self {
            destination,
            next_hop,
        }
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.destination, self.next_hop)
    }
}
