//! Router trait and routing decision logic

use mesh_wire::NodeId;
use serde::{Deserialize, Serialize};

/// Routing decision result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Deliver locally (we are the destination)
    Local,
    /// Hand the packet to a learned next hop
    Forward(NodeId),
    /// No route known, try the destination as a direct neighbour
    Direct(NodeId),
}

/// Outcome of feeding an observation into the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearnOutcome {
    /// A new entry was inserted
    Added,
    /// An existing entry got a different next hop
    Updated,
    /// The same route was already known
    Unchanged,
    /// Trivial self-route, nothing learned
    Ignored,
}

/// Router trait for making routing decisions
pub trait Router: Send {
    /// Decide where a packet for `destination` goes next
    fn decide(&self, destination: NodeId) -> RoutingDecision;

    /// Record that `destination` was heard through `next_hop`
    fn learn(&mut self, destination: NodeId, next_hop: NodeId) -> LearnOutcome;

    /// Forget every route to `destination`
    fn invalidate(&mut self, destination: NodeId) -> usize;

    /// Get routing statistics
    fn get_stats(&self) -> RouterStats;
}

/// Router statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Total number of routes
    pub total_routes: usize,
    /// Number of lookups answered from the table
    pub hits: u64,
    /// Number of lookups that found no route
    pub misses: u64,
    /// Routes inserted or rewritten
    pub learned: u64,
    /// Routes removed after failures
    pub invalidated: u64,
}
