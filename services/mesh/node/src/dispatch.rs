//! Incoming dispatch, forwarding, route learning, and registry sweeps.

use crate::clock::Clock;
use crate::node::MeshNode;
use crate::transport::Transport;
use mesh_wire::{MessageType, NodeId, OutgoingRecord, Packet, MAX_PAYLOAD};
use tracing::{debug, info};

/// Where a received packet goes after local handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Onward {
    /// Consumed here
    Stop,
    /// Rebroadcast with one hop less
    Relay,
    /// Sent toward `original_target` along the routing table
    Forward,
}

impl<T: Transport, C: Clock> MeshNode<T, C> {
    /// Handle at most one received packet
    pub(crate) fn dispatch_next_incoming(&mut self) {
        let Some(record) = self.receive.pop_incoming() else {
            return;
        };

        let immediate_sender = record.immediate_sender;
        let packet = &record.packet;
        let for_us = packet.original_target == self.local;
        debug!(
            msg_id = packet.message_id,
            ttl = packet.ttl,
            "{} from {} to {} via {}",
            packet.message_type,
            packet.original_sender,
            packet.original_target,
            immediate_sender
        );

        let onward = match packet.message_type {
            MessageType::Broadcast => {
                self.deliver(packet);
                Onward::Relay
            }
            MessageType::Unicast if for_us => {
                self.deliver(packet);
                Onward::Stop
            }
            MessageType::UnicastWithConfirm if for_us => {
                self.deliver(packet);
                self.acknowledge(packet.original_sender, packet.message_id);
                Onward::Stop
            }
            MessageType::DeliveryConfirmResponse if for_us => {
                self.accept_confirmation(packet);
                Onward::Stop
            }
            MessageType::Unicast
            | MessageType::UnicastWithConfirm
            | MessageType::DeliveryConfirmResponse => Onward::Forward,
            MessageType::SearchRequest if for_us => {
                self.originate_flood(MessageType::SearchResponse, packet.original_sender);
                Onward::Stop
            }
            MessageType::SearchResponse if for_us => Onward::Stop,
            MessageType::SearchRequest | MessageType::SearchResponse => Onward::Relay,
        };

        if matches!(
            packet.message_type,
            MessageType::SearchRequest | MessageType::SearchResponse
        ) {
            self.router.learn(packet.original_sender, immediate_sender);
        }

        match onward {
            Onward::Stop => {}
            Onward::Relay => {
                let mut record = record;
                if !record.packet.decrement_ttl() {
                    debug!(msg_id = record.packet.message_id, "TTL exhausted, not relaying");
                    return;
                }
                self.outgoing
                    .push_back(record.recast(|r| OutgoingRecord::new(NodeId::BROADCAST, r.packet.clone())));
                self.stats.forwarded += 1;
            }
            Onward::Forward => {
                let next_hop = self.next_hop_for(record.packet.original_target);
                debug!(
                    msg_id = record.packet.message_id,
                    next_hop = %next_hop,
                    "Forwarding toward {}",
                    record.packet.original_target
                );
                self.outgoing
                    .push_back(record.recast(|r| OutgoingRecord::new(next_hop, r.packet.clone())));
                self.stats.forwarded += 1;
            }
        }
    }

    /// Hand a payload addressed to this node to the application
    fn deliver(&mut self, packet: &Packet) {
        self.stats.delivered += 1;
        let Some(handler) = self.handler.as_mut() else {
            return;
        };

        let mut buf = [0u8; MAX_PAYLOAD];
        let payload = &mut buf[..packet.message_size()];
        payload.copy_from_slice(packet.payload());
        self.obfuscator.apply(payload);

        if packet.message_type == MessageType::Broadcast {
            handler.on_broadcast_received(payload, packet.original_sender);
        } else {
            handler.on_unicast_received(payload, packet.original_sender);
        }
    }

    /// Answer a confirmed unicast with its message ID
    fn acknowledge(&mut self, requester: NodeId, confirmed_id: u16) {
        let message_id = self.next_message_id();
        let mut packet = match Packet::new(
            MessageType::DeliveryConfirmResponse,
            message_id,
            requester,
            self.local,
            &confirmed_id.to_le_bytes(),
        ) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Cannot build confirmation: {}", e);
                return;
            }
        };
        packet.net_name = self.net_name;

        let next_hop = self.next_hop_for(requester);
        debug!(msg_id = confirmed_id, next_hop = %next_hop, "Confirming delivery to {}", requester);
        self.enqueue_or_drop(OutgoingRecord::new(next_hop, packet));
    }

    fn accept_confirmation(&mut self, packet: &Packet) {
        let &[lo, hi, ..] = packet.payload() else {
            debug!("Confirmation from {} without message ID", packet.original_sender);
            return;
        };
        let confirmed_id = u16::from_le_bytes([lo, hi]);
        if self.confirmations.resolve(packet.original_sender, confirmed_id) {
            info!(msg_id = confirmed_id, "Delivery to {} confirmed", packet.original_sender);
            self.notify_confirm(packet.original_sender, confirmed_id, true);
        } else {
            debug!(msg_id = confirmed_id, "Unmatched confirmation from {}", packet.original_sender);
        }
    }

    /// Resend packets whose route appeared, drop those that waited too long
    pub(crate) fn sweep_waiting(&mut self, now_ms: u64) {
        if self.waiting.is_empty() {
            return;
        }

        let router = &self.router;
        let routed = self
            .waiting
            .drain_where(|r| router.lookup(r.packet.original_target).is_some());
        for record in routed {
            let next_hop = self.next_hop_for(record.packet.original_target);
            info!(
                msg_id = record.packet.message_id,
                "Route to {} found via {}, resending",
                record.packet.original_target,
                next_hop
            );
            self.outgoing
                .push_back(record.recast(|r| OutgoingRecord::new(next_hop, r.packet.clone())));
        }

        let timeout_ms = self.config.route_discovery_timeout_ms;
        let expired = self.waiting.drain_where(|r| r.age_ms(now_ms) > timeout_ms);
        for record in expired {
            let packet = &record.packet;
            info!(
                msg_id = packet.message_id,
                "No route to {}, {} undelivered",
                packet.original_target,
                packet.message_type
            );
            if packet.message_type == MessageType::UnicastWithConfirm
                && packet.original_sender == self.local
            {
                self.notify_confirm(packet.original_target, packet.message_id, false);
            }
        }
    }

    /// Fail confirmations that timed out and look for a fresh route
    pub(crate) fn sweep_confirmations(&mut self, now_ms: u64) {
        let timeout_ms = self.config.route_discovery_timeout_ms;
        for entry in self.confirmations.expire(now_ms, timeout_ms) {
            info!(
                msg_id = entry.message_id,
                "No confirmation from {} within {} ms",
                entry.destination,
                timeout_ms
            );
            self.originate_flood(MessageType::SearchRequest, entry.destination);
            self.notify_confirm(entry.destination, entry.message_id, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::receive::Admission;
    use crate::sim::MeshEvent;
    use crate::testing::{test_node, B, C, LOCAL};
    use mesh_wire::DEFAULT_TTL;

    fn frame(message_type: MessageType, id: u16, target: NodeId, sender: NodeId, payload: &[u8]) -> Packet {
        Packet::new(message_type, id, target, sender, payload).unwrap()
    }

    #[test]
    fn test_one_packet_per_tick() {
        let (mut node, _, _, handler) = test_node(NodeConfig::default());
        for id in 1..=3 {
            let packet = frame(MessageType::Unicast, id, LOCAL, B, &[id as u8]);
            assert_eq!(node.on_receive(&packet.to_bytes(), B), Admission::Queued);
        }

        node.maintenance();
        assert_eq!(handler.events().len(), 1);
        assert_eq!(node.incoming_len(), 2);
        node.maintenance();
        node.maintenance();
        assert_eq!(handler.events().len(), 3);
    }

    #[test]
    fn test_broadcast_delivered_and_relayed() {
        let (mut node, transport, _, handler) = test_node(NodeConfig::default());
        let packet = frame(MessageType::Broadcast, 5, NodeId::BROADCAST, B, &[7]);
        node.on_receive(&packet.to_bytes(), C);

        node.maintenance();
        assert_eq!(
            handler.events(),
            vec![MeshEvent::Broadcast { payload: vec![7], sender: B }]
        );
        node.maintenance();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.is_broadcast());
        assert_eq!(sent[0].1.message_id, 5);
        assert_eq!(sent[0].1.original_sender, B);
        assert_eq!(sent[0].1.ttl, DEFAULT_TTL - 1);
    }

    #[test]
    fn test_ttl_zero_delivered_not_relayed() {
        let (mut node, transport, _, handler) = test_node(NodeConfig::default());
        let mut packet = frame(MessageType::Broadcast, 5, NodeId::BROADCAST, B, &[7]);
        packet.ttl = 0;
        node.on_receive(&packet.to_bytes(), C);

        node.maintenance();
        node.maintenance();
        assert_eq!(handler.events().len(), 1);
        assert!(transport.sent().is_empty());
        assert_eq!(node.pool().outstanding(), 0);
    }

    #[test]
    fn test_relay_keeps_obfuscated_payload() {
        let config = NodeConfig {
            crypt_key: "k".into(),
            ..NodeConfig::default()
        };
        let (mut node, transport, _, handler) = test_node(config);
        let packet = frame(MessageType::Broadcast, 5, NodeId::BROADCAST, B, &[1 ^ b'k', 2 ^ b'k']);
        node.on_receive(&packet.to_bytes(), B);

        node.maintenance();
        node.maintenance();
        assert_eq!(
            handler.events(),
            vec![MeshEvent::Broadcast { payload: vec![1, 2], sender: B }]
        );
        assert_eq!(transport.sent()[0].1.payload(), &[1 ^ b'k', 2 ^ b'k']);
    }

    #[test]
    fn test_unicast_forwarded_unchanged() {
        let (mut node, transport, _, handler) = test_node(NodeConfig::default());
        node.router.learn(B, C);
        let sender = NodeId::new([0xEE; 6]);
        let mut packet = frame(MessageType::UnicastWithConfirm, 9, B, sender, &[3]);
        packet.ttl = 2;
        node.on_receive(&packet.to_bytes(), sender);

        node.maintenance();
        node.maintenance();
        assert!(handler.events().is_empty());

        let (hop, forwarded) = &transport.sent()[0];
        assert_eq!(*hop, C);
        assert_eq!(forwarded, &packet);
    }

    #[test]
    fn test_confirmed_unicast_is_acknowledged() {
        let (mut node, transport, _, handler) = test_node(NodeConfig::default());
        let packet = frame(MessageType::UnicastWithConfirm, 0x1234, LOCAL, B, &[3]);
        node.on_receive(&packet.to_bytes(), C);

        node.maintenance();
        node.maintenance();
        assert_eq!(
            handler.events(),
            vec![MeshEvent::Unicast { payload: vec![3], sender: B }]
        );

        let (hop, ack) = &transport.sent()[0];
        assert_eq!(*hop, B);
        assert_eq!(ack.message_type, MessageType::DeliveryConfirmResponse);
        assert_eq!(ack.original_target, B);
        assert_eq!(ack.original_sender, LOCAL);
        assert_eq!(ack.payload(), &[0x34, 0x12]);
    }

    #[test]
    fn test_confirmation_fires_once() {
        let (mut node, _, _, handler) = test_node(NodeConfig::default());
        node.confirmations.register(B, 0x1234, 0);

        let ack = frame(MessageType::DeliveryConfirmResponse, 1, LOCAL, B, &[0x34, 0x12]);
        let again = frame(MessageType::DeliveryConfirmResponse, 2, LOCAL, B, &[0x34, 0x12]);
        node.on_receive(&ack.to_bytes(), B);
        node.on_receive(&again.to_bytes(), B);
        node.maintenance();
        node.maintenance();

        assert_eq!(handler.confirmations(), vec![(B, 0x1234, true)]);
        assert!(node.pending_confirmations().is_empty());
    }

    #[test]
    fn test_search_request_for_us_is_answered() {
        let (mut node, transport, _, _) = test_node(NodeConfig::default());
        let request = frame(MessageType::SearchRequest, 3, LOCAL, B, &[]);
        node.on_receive(&request.to_bytes(), C);

        node.maintenance();
        assert_eq!(node.routes(), &[mesh_routing::RouteEntry::new(B, C)]);
        node.maintenance();

        let (hop, response) = &transport.sent()[0];
        assert!(hop.is_broadcast());
        assert_eq!(response.message_type, MessageType::SearchResponse);
        assert_eq!(response.original_target, B);
        assert_eq!(response.ttl, DEFAULT_TTL);
    }

    #[test]
    fn test_search_traffic_relayed_and_learned() {
        let (mut node, ..) = test_node(NodeConfig::default());
        let far = NodeId::new([0xEE; 6]);
        let request = frame(MessageType::SearchRequest, 3, far, B, &[]);
        node.on_receive(&request.to_bytes(), C);
        // heard straight from its origin: no self-route
        let response = frame(MessageType::SearchResponse, 4, far, C, &[]);
        node.on_receive(&response.to_bytes(), C);

        node.maintenance();
        node.maintenance();
        assert_eq!(node.routes(), &[mesh_routing::RouteEntry::new(B, C)]);
        assert_eq!(node.outgoing_len(), 2);
    }

    #[test]
    fn test_route_learning_idempotent() {
        let (mut node, _, _, _) = test_node(NodeConfig::default());
        for id in 0..8u16 {
            let message_type = if id % 2 == 0 {
                MessageType::SearchRequest
            } else {
                MessageType::SearchResponse
            };
            let packet = frame(message_type, id, LOCAL, B, &[]);
            node.on_receive(&packet.to_bytes(), C);
            node.maintenance();
        }
        assert_eq!(node.routes(), &[mesh_routing::RouteEntry::new(B, C)]);
    }

    #[test]
    fn test_waiting_resent_once_route_learned() {
        let config = NodeConfig {
            max_attempts: 1,
            ..NodeConfig::default()
        };
        let (mut node, transport, _, _) = test_node(config);
        node.send_unicast(&[1], B, true).unwrap();
        node.maintenance();
        node.on_send_complete(false);
        node.maintenance();
        assert_eq!(node.waiting_len(), 1);

        let response = frame(MessageType::SearchResponse, 77, LOCAL, B, &[]);
        node.on_receive(&response.to_bytes(), C);
        node.on_send_complete(true);
        node.maintenance();
        assert_eq!(node.waiting_len(), 0);

        node.maintenance();
        let (hop, resent) = transport.sent().last().cloned().unwrap();
        assert_eq!(hop, C);
        assert_eq!(resent.message_type, MessageType::UnicastWithConfirm);
        assert_eq!(resent.original_target, B);
    }

    #[test]
    fn test_confirmation_timeout_searches_again() {
        let (mut node, transport, clock, handler) = test_node(NodeConfig::default());
        let id = node.send_unicast(&[1], B, true).unwrap();
        node.maintenance();
        node.on_send_complete(true);
        node.maintenance();
        assert_eq!(node.pending_confirmations().len(), 1);

        clock.advance(500);
        node.maintenance();
        assert!(handler.confirmations().is_empty());

        clock.advance(1);
        node.maintenance();
        assert_eq!(handler.confirmations(), vec![(B, id, false)]);
        assert!(node.pending_confirmations().is_empty());

        node.maintenance();
        let (_, search) = transport.sent().last().cloned().unwrap();
        assert_eq!(search.message_type, MessageType::SearchRequest);
        assert_eq!(search.original_target, B);
    }
}
