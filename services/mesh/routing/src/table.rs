//! Routing table implementation

use crate::next_hop::RouteEntry;
use crate::router::{LearnOutcome, Router, RouterStats, RoutingDecision};
use mesh_wire::NodeId;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Learned destination to next-hop table
///
/// Entries are kept in insertion order and looked up by linear scan; the
/// table holds at most one entry per destination.
#[derive(Debug)]
pub struct RoutingTable {
    /// Local node ID
    local_node_id: NodeId,
    /// Learned routes
    routes: Vec<RouteEntry>,
    /// Counters for statistics
    hits_counter: AtomicU64,
    misses_counter: AtomicU64,
    learned_counter: u64,
    invalidated_counter: u64,
}

impl RoutingTable {
    /// Create a new, empty routing table
    pub fn new(local_node_id: NodeId) -> Self {
        Self {
            local_node_id,
            routes: Vec::new(),
            hits_counter: AtomicU64::new(0),
            misses_counter: AtomicU64::new(0),
            learned_counter: 0,
            invalidated_counter: 0,
        }
    }

    /// Next hop for `destination`, if one has been learned
    pub fn lookup(&self, destination: NodeId) -> Option<NodeId> {
        self.routes
            .iter()
            .find(|entry| entry.destination == destination)
            .map(|entry| entry.next_hop)
    }

    /// Insert or rewrite the route to `destination`
    ///
    /// An existing entry is overwritten when the next hop differs. A new entry
    /// is only created when `destination != next_hop`, so a neighbour heard
    /// directly never produces a trivial self-route.
    pub fn learn(&mut self, destination: NodeId, next_hop: NodeId) -> LearnOutcome {
        if let Some(entry) = self
            .routes
            .iter_mut()
            .find(|entry| entry.destination == destination)
        {
            if entry.next_hop == next_hop {
                return LearnOutcome::Unchanged;
            }
            info!(
                "Route to {} changed from {} to {}",
                destination, entry.next_hop, next_hop
            );
            entry.next_hop = next_hop;
            self.learned_counter += 1;
            return LearnOutcome::Updated;
        }

        if destination == next_hop {
            return LearnOutcome::Ignored;
        }

        info!("Learned route to {} via {}", destination, next_hop);
        self.routes.push(RouteEntry::new(destination, next_hop));
        self.learned_counter += 1;
        LearnOutcome::Added
    }

    /// Remove every entry for `destination`, returning how many were removed
    pub fn invalidate(&mut self, destination: NodeId) -> usize {
        let before = self.routes.len();
        self.routes.retain(|entry| entry.destination != destination);
        let removed = before - self.routes.len();
        if removed > 0 {
            info!("Removed route to {}", destination);
            self.invalidated_counter += removed as u64;
        } else {
            debug!("No route to {} to remove", destination);
        }
        removed
    }

    /// Get all routes
    pub fn entries(&self) -> &[RouteEntry] {
        &self.routes
    }

    /// Number of learned routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route has been learned
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Router for RoutingTable {
    fn decide(&self, destination: NodeId) -> RoutingDecision {
        if destination == self.local_node_id {
            return RoutingDecision::Local;
        }

        match self.lookup(destination) {
            Some(next_hop) => {
                self.hits_counter.fetch_add(1, Ordering::Relaxed);
                RoutingDecision::Forward(next_hop)
            }
            None => {
                debug!("No route to destination {}", destination);
                self.misses_counter.fetch_add(1, Ordering::Relaxed);
                RoutingDecision::Direct(destination)
            }
        }
    }

    fn learn(&mut self, destination: NodeId, next_hop: NodeId) -> LearnOutcome {
        RoutingTable::learn(self, destination, next_hop)
    }

    fn invalidate(&mut self, destination: NodeId) -> usize {
        RoutingTable::invalidate(self, destination)
    }

    fn get_stats(&self) -> RouterStats {
        RouterStats {
            total_routes: self.routes.len(),
            hits: self.hits_counter.load(Ordering::Relaxed),
            misses: self.misses_counter.load(Ordering::Relaxed),
            learned: self.learned_counter,
            invalidated: self.invalidated_counter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: NodeId = NodeId::new([0xAA; 6]);
    const B: NodeId = NodeId::new([0xBB; 6]);
    const C: NodeId = NodeId::new([0xCC; 6]);
    const D: NodeId = NodeId::new([0xDD; 6]);

    #[test]
    fn test_learn_and_lookup() {
        let mut table = RoutingTable::new(LOCAL);
        assert_eq!(table.lookup(B), None);

        assert_eq!(table.learn(B, C), LearnOutcome::Added);
        assert_eq!(table.lookup(B), Some(C));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_learn_is_idempotent() {
        let mut table = RoutingTable::new(LOCAL);
        table.learn(B, C);
        for _ in 0..10 {
            assert_eq!(table.learn(B, C), LearnOutcome::Unchanged);
        }
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries(), &[RouteEntry::new(B, C)]);
    }

    #[test]
    fn test_learn_overwrites_next_hop() {
        let mut table = RoutingTable::new(LOCAL);
        table.learn(B, C);
        assert_eq!(table.learn(B, D), LearnOutcome::Updated);
        assert_eq!(table.lookup(B), Some(D));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_learn_ignores_self_route() {
        let mut table = RoutingTable::new(LOCAL);
        assert_eq!(table.learn(B, B), LearnOutcome::Ignored);
        assert!(table.is_empty());
    }

    #[test]
    fn test_existing_entry_can_become_direct() {
        let mut table = RoutingTable::new(LOCAL);
        table.learn(B, C);
        assert_eq!(table.learn(B, B), LearnOutcome::Updated);
        assert_eq!(table.lookup(B), Some(B));
    }

    #[test]
    fn test_invalidate() {
        let mut table = RoutingTable::new(LOCAL);
        table.learn(B, C);
        table.learn(D, C);

        assert_eq!(table.invalidate(B), 1);
        assert_eq!(table.lookup(B), None);
        assert_eq!(table.lookup(D), Some(C));
        assert_eq!(table.invalidate(B), 0);
    }

    #[test]
    fn test_routing_decisions() {
        let mut table = RoutingTable::new(LOCAL);
        table.learn(B, C);

        assert_eq!(table.decide(LOCAL), RoutingDecision::Local);
        assert_eq!(table.decide(B), RoutingDecision::Forward(C));
        assert_eq!(table.decide(D), RoutingDecision::Direct(D));

        let stats = table.get_stats();
        assert_eq!(stats.total_routes, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.learned, 1);

        table.invalidate(B);
        assert_eq!(table.get_stats().invalidated, 1);
    }
}
