//! The mesh node context object.

use crate::clock::Clock;
use crate::config::{
    NodeConfig, MAX_ATTEMPTS_RANGE, ROUTE_DISCOVERY_RANGE_MS, TRANSMISSION_WAIT_RANGE_MS,
};
use crate::error::{check_range, MeshError};
use crate::handler::MeshHandler;
use crate::outgoing::SendState;
use crate::receive::{Admission, ReceiveHandle, ReceiveShared};
use crate::registry::{ConfirmationRegistry, PendingConfirmation, WaitingRegistry};
use crate::slot::{OutgoingBox, PacketPool};
use crate::stats::NodeStats;
use crate::transport::Transport;
use mesh_routing::{RouteEntry, Router, RoutingDecision, RoutingTable};
use mesh_storage::Priority;
use mesh_wire::{MessageType, NetName, NodeId, Obfuscator, OutgoingRecord, Packet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Version reported by [`MeshNode::firmware_version`]
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One mesh node: routing table, queues, registries, and send state
///
/// Everything except the receive path is driven by [`MeshNode::maintenance`],
/// which the owner calls repeatedly. Inbound datagrams and send completions
/// enter through a [`ReceiveHandle`] that may live on another thread.
pub struct MeshNode<T: Transport, C: Clock> {
    pub(crate) local: NodeId,
    pub(crate) net_name: NetName,
    pub(crate) obfuscator: Obfuscator,
    pub(crate) config: NodeConfig,
    pub(crate) transport: T,
    pub(crate) clock: C,
    pub(crate) handler: Option<Box<dyn MeshHandler>>,
    pub(crate) pool: PacketPool,
    pub(crate) receive: Arc<ReceiveShared>,
    pub(crate) router: RoutingTable,
    pub(crate) outgoing: VecDeque<OutgoingBox>,
    pub(crate) waiting: WaitingRegistry,
    pub(crate) confirmations: ConfirmationRegistry,
    pub(crate) send_state: SendState,
    pub(crate) failed_attempts: u8,
    pub(crate) rng: StdRng,
    pub(crate) stats: NodeStats,
}

impl<T: Transport, C: Clock> MeshNode<T, C> {
    /// Create a node with identifier `local`
    pub fn new(local: NodeId, config: NodeConfig, transport: T, clock: C) -> Result<Self, MeshError> {
        config.validate()?;
        if local.is_broadcast() {
            return Err(MeshError::InvalidDestination(local));
        }

        let net_name = config.network()?;
        let obfuscator = config.obfuscator()?;
        let pool = match config.pool_reserve {
            Some(reserve) => PacketPool::with_reserve(config.pool_capacity, reserve),
            None => PacketPool::new(config.pool_capacity),
        };
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            "Mesh node {} starting (network {:?}, {} buffers)",
            local,
            net_name.as_str(),
            config.pool_capacity
        );

        Ok(Self {
            local,
            net_name,
            obfuscator,
            receive: Arc::new(ReceiveShared::new(local, net_name, pool.clone())),
            waiting: WaitingRegistry::new(config.waiting_capacity),
            router: RoutingTable::new(local),
            pool,
            config,
            transport,
            clock,
            handler: None,
            outgoing: VecDeque::new(),
            confirmations: ConfirmationRegistry::new(),
            send_state: SendState::Idle,
            failed_attempts: 0,
            rng,
            stats: NodeStats::default(),
        })
    }

    /// Install the application callbacks
    pub fn set_handler(&mut self, handler: impl MeshHandler + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Remove the application callbacks
    pub fn clear_handler(&mut self) {
        self.handler = None;
    }

    /// Handle for the transport's receive and completion callbacks
    pub fn receive_handle(&self) -> ReceiveHandle {
        ReceiveHandle::new(Arc::clone(&self.receive))
    }

    /// Shorthand for [`ReceiveHandle::on_receive`]
    pub fn on_receive(&self, data: &[u8], immediate_sender: NodeId) -> Admission {
        self.receive_handle().on_receive(data, immediate_sender)
    }

    /// Shorthand for [`ReceiveHandle::on_send_complete`]
    pub fn on_send_complete(&self, success: bool) {
        self.receive_handle().on_send_complete(success)
    }

    /// Flood `payload` to every node in range, returning its message ID
    pub fn send_broadcast(&mut self, payload: &[u8]) -> Result<u16, MeshError> {
        let message_id = self.next_message_id();
        let mut packet = Packet::new(
            MessageType::Broadcast,
            message_id,
            NodeId::BROADCAST,
            self.local,
            payload,
        )?;
        packet.net_name = self.net_name;
        self.obfuscator.apply(packet.payload_mut());

        self.enqueue(OutgoingRecord::new(NodeId::BROADCAST, packet))?;
        debug!(msg_id = message_id, "Queued broadcast of {} bytes", payload.len());
        Ok(message_id)
    }

    /// Route `payload` to `destination`, returning its message ID
    ///
    /// With `confirm` the destination acknowledges delivery and the outcome is
    /// reported through [`MeshHandler::on_confirm`].
    pub fn send_unicast(
        &mut self,
        payload: &[u8],
        destination: NodeId,
        confirm: bool,
    ) -> Result<u16, MeshError> {
        if destination == self.local || destination.is_broadcast() {
            return Err(MeshError::InvalidDestination(destination));
        }

        let message_type = if confirm {
            MessageType::UnicastWithConfirm
        } else {
            MessageType::Unicast
        };
        let message_id = self.next_message_id();
        let mut packet = Packet::new(message_type, message_id, destination, self.local, payload)?;
        packet.net_name = self.net_name;
        self.obfuscator.apply(packet.payload_mut());

        let next_hop = self.next_hop_for(destination);
        self.enqueue(OutgoingRecord::new(next_hop, packet))?;
        debug!(
            msg_id = message_id,
            dst = %destination,
            next_hop = %next_hop,
            "Queued {}",
            message_type
        );
        Ok(message_id)
    }

    /// Advance every queue and registry by one step
    ///
    /// Handles the last send completion, starts the next transmission,
    /// dispatches at most one received packet, then sweeps the waiting and
    /// confirmation registries.
    pub fn maintenance(&mut self) {
        let now_ms = self.clock.now_ms();
        self.poll_send_state(now_ms);
        self.start_next_send(now_ms);
        self.dispatch_next_incoming();
        self.sweep_waiting(now_ms);
        self.sweep_confirmations(now_ms);
    }

    /// Set the number of transmissions per frame (1-10)
    pub fn set_max_attempts(&mut self, attempts: u8) -> Result<(), MeshError> {
        check_range(
            "max_attempts",
            attempts as u64,
            MAX_ATTEMPTS_RANGE.0 as u64,
            MAX_ATTEMPTS_RANGE.1 as u64,
        )?;
        self.config.max_attempts = attempts;
        Ok(())
    }

    /// Number of transmissions per frame
    pub fn max_attempts(&self) -> u8 {
        self.config.max_attempts
    }

    /// Set the send completion timeout in milliseconds (50-250)
    pub fn set_max_wait_between_transmissions(&mut self, ms: u64) -> Result<(), MeshError> {
        check_range(
            "max_wait_between_transmissions_ms",
            ms,
            TRANSMISSION_WAIT_RANGE_MS.0,
            TRANSMISSION_WAIT_RANGE_MS.1,
        )?;
        self.config.max_wait_between_transmissions_ms = ms;
        Ok(())
    }

    /// Send completion timeout in milliseconds
    pub fn max_wait_between_transmissions(&self) -> u64 {
        self.config.max_wait_between_transmissions_ms
    }

    /// Set the route discovery and confirmation timeout in milliseconds (500-5000)
    pub fn set_route_discovery_timeout(&mut self, ms: u64) -> Result<(), MeshError> {
        check_range(
            "route_discovery_timeout_ms",
            ms,
            ROUTE_DISCOVERY_RANGE_MS.0,
            ROUTE_DISCOVERY_RANGE_MS.1,
        )?;
        self.config.route_discovery_timeout_ms = ms;
        Ok(())
    }

    /// Route discovery and confirmation timeout in milliseconds
    pub fn route_discovery_timeout(&self) -> u64 {
        self.config.route_discovery_timeout_ms
    }

    /// Identifier of this node
    pub fn node_id(&self) -> NodeId {
        self.local
    }

    /// Version string of this build
    pub fn firmware_version(&self) -> &'static str {
        FIRMWARE_VERSION
    }

    /// Current configuration, including runtime changes
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Learned routes
    pub fn routes(&self) -> &[RouteEntry] {
        self.router.entries()
    }

    /// Acknowledgements still awaited
    pub fn pending_confirmations(&self) -> &[PendingConfirmation] {
        self.confirmations.entries()
    }

    /// Packets waiting for route discovery
    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Packets queued for transmission, including the one in flight
    pub fn outgoing_len(&self) -> usize {
        self.outgoing.len()
    }

    /// Received packets not yet dispatched
    pub fn incoming_len(&self) -> usize {
        self.receive.incoming_len()
    }

    /// Whether nothing is queued, parked, in flight, or awaiting confirmation
    pub fn is_idle(&self) -> bool {
        self.send_state.is_idle()
            && self.outgoing.is_empty()
            && self.waiting.is_empty()
            && self.confirmations.is_empty()
            && self.receive.incoming_len() == 0
    }

    /// Buffer pool backing this node
    pub fn pool(&self) -> &PacketPool {
        &self.pool
    }

    /// Transport the node sends through
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the traffic counters
    pub fn stats(&self) -> NodeStats {
        let counters = &self.receive.counters;
        let routing = self.router.get_stats();
        NodeStats {
            received: counters.received.load(Ordering::Relaxed),
            dropped_foreign: counters.foreign.load(Ordering::Relaxed),
            dropped_duplicate: counters.duplicate.load(Ordering::Relaxed),
            dropped_busy: counters.busy.load(Ordering::Relaxed),
            dropped_no_buffer: self.stats.dropped_no_buffer
                + counters.no_buffer.load(Ordering::Relaxed),
            routes: routing.total_routes,
            route_hits: routing.hits,
            route_misses: routing.misses,
            routes_learned: routing.learned,
            routes_invalidated: routing.invalidated,
            ..self.stats.clone()
        }
    }

    pub(crate) fn next_message_id(&mut self) -> u16 {
        self.rng.gen()
    }

    /// Learned next hop for `destination`, or the destination itself
    pub(crate) fn next_hop_for(&self, destination: NodeId) -> NodeId {
        match self.router.decide(destination) {
            RoutingDecision::Forward(next_hop) => next_hop,
            RoutingDecision::Direct(target) => target,
            RoutingDecision::Local => destination,
        }
    }

    /// Take a buffer for `record` and append it to the outgoing queue
    pub(crate) fn enqueue(&mut self, record: OutgoingRecord) -> Result<(), MeshError> {
        let priority = if record.packet.message_type.is_control() {
            Priority::Important
        } else {
            Priority::Normal
        };
        let mut slot: OutgoingBox = self.pool.take_with(priority)?;
        *slot = record;
        self.outgoing.push_back(slot);
        Ok(())
    }

    /// Queue an internally generated packet, dropping it when no buffer is free
    pub(crate) fn enqueue_or_drop(&mut self, record: OutgoingRecord) -> bool {
        let message_type = record.packet.message_type;
        let message_id = record.packet.message_id;
        match self.enqueue(record) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping {} {}: {}", message_type, message_id, e);
                self.stats.dropped_no_buffer += 1;
                false
            }
        }
    }

    /// Originate an empty flood packet toward `target`
    pub(crate) fn originate_flood(&mut self, message_type: MessageType, target: NodeId) {
        let message_id = self.next_message_id();
        let mut packet = match Packet::new(message_type, message_id, target, self.local, &[]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Cannot build {}: {}", message_type, e);
                return;
            }
        };
        packet.net_name = self.net_name;
        if self.enqueue_or_drop(OutgoingRecord::new(NodeId::BROADCAST, packet))
            && message_type == MessageType::SearchRequest
        {
            self.stats.search_requests += 1;
            info!(msg_id = message_id, "Searching for a route to {}", target);
        }
    }

    pub(crate) fn notify_confirm(&mut self, destination: NodeId, message_id: u16, delivered: bool) {
        if delivered {
            self.stats.confirmed += 1;
        } else {
            self.stats.unconfirmed += 1;
        }
        if let Some(handler) = self.handler.as_mut() {
            handler.on_confirm(destination, message_id, delivered);
        }
    }
}

impl<T: Transport, C: Clock> std::fmt::Debug for MeshNode<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshNode")
            .field("node_id", &self.local)
            .field("net_name", &self.net_name)
            .field("send_state", &self.send_state)
            .field("outgoing", &self.outgoing.len())
            .field("waiting", &self.waiting.len())
            .field("confirmations", &self.confirmations.len())
            .field("routes", &self.router.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sim::MeshEvent;
    use crate::testing::{test_node, ScriptedTransport, B, C, LOCAL};
    use mesh_wire::MAX_PAYLOAD;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = NodeConfig {
            max_attempts: 11,
            ..NodeConfig::default()
        };
        let result = MeshNode::new(LOCAL, config, ScriptedTransport::default(), ManualClock::new());
        assert!(matches!(result, Err(MeshError::OutOfRange { .. })));

        let config = NodeConfig {
            waiting_capacity: usize::MAX,
            ..NodeConfig::default()
        };
        let result = MeshNode::new(LOCAL, config, ScriptedTransport::default(), ManualClock::new());
        assert!(matches!(result, Err(MeshError::Config(_))));

        let result = MeshNode::new(
            NodeId::BROADCAST,
            NodeConfig::default(),
            ScriptedTransport::default(),
            ManualClock::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_setters_validate() {
        let (mut node, ..) = test_node(NodeConfig::default());

        assert!(node.set_max_attempts(0).is_err());
        assert!(node.set_max_attempts(11).is_err());
        assert_eq!(node.max_attempts(), 3);
        node.set_max_attempts(10).unwrap();
        assert_eq!(node.max_attempts(), 10);

        assert!(node.set_max_wait_between_transmissions(49).is_err());
        node.set_max_wait_between_transmissions(250).unwrap();
        assert_eq!(node.max_wait_between_transmissions(), 250);

        assert!(node.set_route_discovery_timeout(5001).is_err());
        node.set_route_discovery_timeout(5000).unwrap();
        assert_eq!(node.route_discovery_timeout(), 5000);
    }

    #[test]
    fn test_identity_getters() {
        let (node, ..) = test_node(NodeConfig::default());
        assert_eq!(node.node_id(), LOCAL);
        assert_eq!(node.firmware_version(), env!("CARGO_PKG_VERSION"));
        assert_eq!(node.receive_handle().node_id(), LOCAL);
        assert!(node.is_idle());
    }

    #[test]
    fn test_send_broadcast_obfuscates() {
        let config = NodeConfig {
            crypt_key: "key".into(),
            net_name: "lab".into(),
            ..NodeConfig::default()
        };
        let (mut node, transport, ..) = test_node(config);

        let id = node.send_broadcast(&[1, 2, 3]).unwrap();
        node.maintenance();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let (next_hop, packet) = &sent[0];
        assert!(next_hop.is_broadcast());
        assert_eq!(packet.message_id, id);
        assert_eq!(packet.message_type, MessageType::Broadcast);
        assert_eq!(packet.net_name, NetName::new("lab").unwrap());
        assert_eq!(packet.payload(), &[1 ^ b'k', 2 ^ b'e', 3 ^ b'y']);
    }

    #[test]
    fn test_send_unicast_validation() {
        let (mut node, ..) = test_node(NodeConfig::default());
        assert_eq!(
            node.send_unicast(&[1], LOCAL, false),
            Err(MeshError::InvalidDestination(LOCAL))
        );
        assert!(node.send_unicast(&[1], NodeId::BROADCAST, true).is_err());
        assert!(matches!(
            node.send_unicast(&[0; MAX_PAYLOAD + 1], B, false),
            Err(MeshError::Wire(_))
        ));
        assert_eq!(node.outgoing_len(), 0);
    }

    #[test]
    fn test_send_unicast_uses_learned_route() {
        let (mut node, transport, ..) = test_node(NodeConfig::default());
        node.router.learn(B, C);

        node.send_unicast(&[5], B, false).unwrap();
        node.maintenance();

        let sent = transport.sent();
        assert_eq!(sent[0].0, C);
        assert_eq!(sent[0].1.original_target, B);
        assert_eq!(sent[0].1.original_sender, LOCAL);
        assert_eq!(transport.peers(), vec![C]);
    }

    #[test]
    fn test_pool_exhaustion_is_reported() {
        let config = NodeConfig {
            pool_capacity: 2,
            ..NodeConfig::default()
        };
        let (mut node, ..) = test_node(config);
        node.send_unicast(&[1], B, false).unwrap();
        node.send_unicast(&[2], B, false).unwrap();
        assert!(matches!(
            node.send_broadcast(&[3]),
            Err(MeshError::Pool(mesh_storage::PoolError::Exhausted))
        ));
    }

    #[test]
    fn test_priority_reserve_for_control_traffic() {
        let config = NodeConfig {
            pool_capacity: 7,
            pool_reserve: Some(5),
            ..NodeConfig::default()
        };
        let (mut node, ..) = test_node(config);
        for i in 0..3u8 {
            node.send_unicast(&[i], B, false).unwrap();
        }
        assert_eq!(
            node.send_broadcast(&[3]),
            Err(MeshError::Pool(mesh_storage::PoolError::Reserved { free: 4, reserve: 5 }))
        );
        assert_eq!(node.outgoing_len(), 3);

        let search = Packet::new(MessageType::SearchRequest, 100, C, B, &[]).unwrap();
        assert_eq!(node.on_receive(&search.to_bytes(), B), Admission::Queued);

        let data = Packet::new(MessageType::Unicast, 101, LOCAL, B, &[9]).unwrap();
        assert_eq!(node.on_receive(&data.to_bytes(), B), Admission::NoBuffer);

        let stats = node.stats();
        assert_eq!(stats.received, 1);
        assert_eq!(stats.dropped_no_buffer, 1);
        assert_eq!(node.pool().outstanding(), 4);
    }

    #[test]
    fn test_stats_include_routing_counters() {
        let (mut node, ..) = test_node(NodeConfig::default());
        let d = NodeId::new([0xDD; 6]);
        node.router.learn(B, C);

        node.send_unicast(&[1], B, false).unwrap();
        node.send_unicast(&[2], d, false).unwrap();
        node.router.invalidate(B);

        let stats = node.stats();
        assert_eq!(stats.routes, 0);
        assert_eq!(stats.route_hits, 1);
        assert_eq!(stats.route_misses, 1);
        assert_eq!(stats.routes_learned, 1);
        assert_eq!(stats.routes_invalidated, 1);
    }

    #[test]
    fn test_message_ids_follow_seed() {
        let (mut first, ..) = test_node(NodeConfig::default());
        let (mut second, ..) = test_node(NodeConfig::default());
        let a: Vec<u16> = (0..4).map(|_| first.send_broadcast(&[]).unwrap()).collect();
        let b: Vec<u16> = (0..4).map(|_| second.send_broadcast(&[]).unwrap()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stats_snapshot() {
        let (mut node, _, _, handler) = test_node(NodeConfig::default());
        let mut packet = Packet::new(MessageType::Unicast, 9, LOCAL, B, &[4]).unwrap();
        packet.ttl = 0;
        let frame = packet.to_bytes();

        assert_eq!(node.on_receive(&frame, B), Admission::Queued);
        assert_eq!(node.on_receive(&frame, B), Admission::Duplicate);
        node.maintenance();

        let stats = node.stats();
        assert_eq!(stats.received, 1);
        assert_eq!(stats.dropped_duplicate, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(handler.events(), vec![MeshEvent::Unicast { payload: vec![4], sender: B }]);
    }
}
