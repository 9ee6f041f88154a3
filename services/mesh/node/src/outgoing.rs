//! Outgoing send state machine.
//!
//! Exactly one frame is in flight at a time. The head of the outgoing queue
//! stays in place until its completion arrives: success pops it, failure
//! leaves it for another attempt until `max_attempts` is spent. A routed
//! packet that runs out of attempts loses its route and waits for discovery;
//! a flooded one is dropped.

use crate::clock::Clock;
use crate::node::MeshNode;
use crate::transport::Transport;
use mesh_wire::{MessageType, WaitingRecord};
use tracing::{debug, info, warn};

/// Whether a frame is currently with the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// Nothing in flight
    Idle,
    /// The queue head was handed to the transport at `since_ms`
    Sending {
        /// Clock time of the hand-over
        since_ms: u64,
    },
}

impl SendState {
    /// Whether a new frame may be sent
    pub fn is_idle(&self) -> bool {
        matches!(self, SendState::Idle)
    }
}

impl<T: Transport, C: Clock> MeshNode<T, C> {
    /// Act on the completion of the frame in flight, if it arrived
    pub(crate) fn poll_send_state(&mut self, now_ms: u64) {
        let since_ms = match self.send_state {
            SendState::Sending { since_ms } => since_ms,
            SendState::Idle => {
                if self.receive.take_completion().is_some() {
                    debug!("Ignoring send completion with nothing in flight");
                }
                return;
            }
        };

        match self.receive.take_completion() {
            Some(true) => self.on_sent(now_ms),
            Some(false) => self.on_send_failed(now_ms),
            None => {
                let waited = now_ms.saturating_sub(since_ms);
                if waited > self.config.max_wait_between_transmissions_ms {
                    warn!("No send completion after {} ms, counting as failed", waited);
                    self.on_send_failed(now_ms);
                }
            }
        }
    }

    /// Hand the queue head to the transport when nothing is in flight
    pub(crate) fn start_next_send(&mut self, now_ms: u64) {
        if !self.send_state.is_idle() {
            return;
        }
        let Some(head) = self.outgoing.front() else {
            return;
        };
        let next_hop = head.next_hop;
        let message_type = head.packet.message_type;
        let message_id = head.packet.message_id;
        let frame = head.packet.to_bytes();

        self.receive.clear_completion();
        let result = self
            .transport
            .add_peer(next_hop)
            .and_then(|()| self.transport.send(&frame, next_hop));

        match result {
            Ok(()) => {
                self.send_state = SendState::Sending { since_ms: now_ms };
                self.stats.frames_sent += 1;
                debug!(
                    msg_id = message_id,
                    next_hop = %next_hop,
                    attempt = self.failed_attempts + 1,
                    "Sent {}",
                    message_type
                );
            }
            Err(e) => {
                warn!("Transport refused {} {}: {}", message_type, message_id, e);
                self.on_send_failed(now_ms);
            }
        }
    }

    fn on_sent(&mut self, now_ms: u64) {
        self.send_state = SendState::Idle;
        self.failed_attempts = 0;
        let Some(record) = self.outgoing.pop_front() else {
            return;
        };
        self.transport.remove_peer(record.next_hop);

        let packet = &record.packet;
        if !record.originated_by(self.local) {
            return;
        }
        match packet.message_type {
            MessageType::Broadcast => {
                let (target, id) = (packet.original_target, packet.message_id);
                self.notify_confirm(target, id, true);
            }
            MessageType::UnicastWithConfirm => {
                debug!(msg_id = packet.message_id, "Awaiting confirmation from {}", packet.original_target);
                self.confirmations
                    .register(packet.original_target, packet.message_id, now_ms);
            }
            _ => {}
        }
    }

    fn on_send_failed(&mut self, now_ms: u64) {
        self.send_state = SendState::Idle;
        self.stats.send_failures += 1;
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        if self.failed_attempts < self.config.max_attempts {
            debug!(
                "Send failed, attempt {} of {}",
                self.failed_attempts, self.config.max_attempts
            );
            return;
        }

        self.failed_attempts = 0;
        let Some(record) = self.outgoing.pop_front() else {
            return;
        };
        self.transport.remove_peer(record.next_hop);
        self.stats.send_exhausted += 1;

        let message_type = record.packet.message_type;
        let message_id = record.packet.message_id;
        let target = record.packet.original_target;
        let local_origin = record.originated_by(self.local);

        if !message_type.is_routed() {
            warn!(msg_id = message_id, "Giving up on {} after {} attempts", message_type, self.config.max_attempts);
            if local_origin && message_type == MessageType::Broadcast {
                self.notify_confirm(target, message_id, false);
            }
            return;
        }

        warn!(
            msg_id = message_id,
            next_hop = %record.next_hop,
            "{} to {} undeliverable, rediscovering route",
            message_type,
            target
        );
        self.router.invalidate(target);

        let waiting = record.recast(|r| WaitingRecord::park(r, now_ms));
        match self.waiting.park(waiting) {
            Ok(()) => {
                info!(msg_id = message_id, "Waiting for a route to {}", target);
                self.originate_flood(MessageType::SearchRequest, target);
            }
            Err(rejected) => {
                warn!(msg_id = message_id, "Waiting registry full, dropping {} to {}", message_type, target);
                self.stats.dropped_no_buffer += 1;
                drop(rejected);
                if local_origin && message_type == MessageType::UnicastWithConfirm {
                    self.notify_confirm(target, message_id, false);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::sim::MeshEvent;
    use crate::testing::{test_node, B, C};
    use mesh_wire::NodeId;

    #[test]
    fn test_retry_then_success() {
        let (mut node, transport, ..) = test_node(NodeConfig::default());
        node.send_unicast(&[1], B, false).unwrap();

        node.maintenance();
        assert_eq!(transport.sent().len(), 1);
        assert!(!node.send_state.is_idle());

        node.on_send_complete(false);
        node.maintenance();
        assert_eq!(transport.sent().len(), 2);
        assert_eq!(node.failed_attempts, 1);

        node.on_send_complete(true);
        node.maintenance();
        assert_eq!(node.outgoing_len(), 0);
        assert_eq!(node.failed_attempts, 0);
        assert!(transport.peers().is_empty());
        assert_eq!(node.stats().send_failures, 1);
    }

    #[test]
    fn test_no_second_send_while_in_flight() {
        let (mut node, transport, ..) = test_node(NodeConfig::default());
        node.send_broadcast(&[1]).unwrap();
        node.send_broadcast(&[2]).unwrap();

        for _ in 0..5 {
            node.maintenance();
        }
        assert_eq!(transport.sent().len(), 1);

        node.on_send_complete(true);
        node.maintenance();
        assert_eq!(transport.sent().len(), 2);
        assert_eq!(transport.sent()[1].1.payload(), &[2]);
    }

    #[test]
    fn test_broadcast_confirmed_on_send() {
        let (mut node, _, _, handler) = test_node(NodeConfig::default());
        let id = node.send_broadcast(&[1]).unwrap();
        node.maintenance();
        node.on_send_complete(true);
        node.maintenance();

        assert_eq!(
            handler.events(),
            vec![MeshEvent::Confirm {
                destination: NodeId::BROADCAST,
                message_id: id,
                delivered: true
            }]
        );
    }

    #[test]
    fn test_broadcast_exhaustion_is_dropped() {
        let (mut node, transport, _, handler) = test_node(NodeConfig::default());
        let id = node.send_broadcast(&[1]).unwrap();
        for _ in 0..3 {
            node.maintenance();
            node.on_send_complete(false);
        }
        node.maintenance();

        assert_eq!(transport.sent().len(), 3);
        assert_eq!(node.waiting_len(), 0);
        assert_eq!(node.outgoing_len(), 0);
        assert_eq!(handler.confirmations(), vec![(NodeId::BROADCAST, id, false)]);
    }

    #[test]
    fn test_retry_exhaustion_rediscovers_route() {
        let (mut node, transport, clock, handler) = test_node(NodeConfig::default());
        node.router.learn(B, C);
        let id = node.send_unicast(&[1, 2, 3], B, true).unwrap();

        for _ in 0..3 {
            node.maintenance();
            node.on_send_complete(false);
        }
        node.maintenance();

        let sent = transport.sent();
        assert_eq!(sent.len(), 4);
        assert!(sent[..3].iter().all(|(hop, _)| *hop == C));
        let (hop, search) = &sent[3];
        assert!(hop.is_broadcast());
        assert_eq!(search.message_type, MessageType::SearchRequest);
        assert_eq!(search.original_target, B);
        assert!(node.routes().is_empty());
        assert_eq!(node.waiting_len(), 1);
        assert!(handler.confirmations().is_empty());

        node.on_send_complete(true);
        node.maintenance();
        clock.advance(501);
        for _ in 0..5 {
            node.maintenance();
        }

        assert_eq!(handler.confirmations(), vec![(B, id, false)]);
        assert_eq!(node.waiting_len(), 0);
        assert_eq!(node.pool().outstanding(), 0);
    }

    #[test]
    fn test_waiting_registry_full_drops() {
        let config = NodeConfig {
            max_attempts: 1,
            ..NodeConfig::default()
        };
        let (mut node, _, _, handler) = test_node(config);
        node.send_unicast(&[1], B, true).unwrap();
        let dropped = node.send_unicast(&[2], C, true).unwrap();

        node.maintenance();
        node.on_send_complete(false);
        node.maintenance();
        node.on_send_complete(false);
        node.maintenance();

        assert_eq!(node.waiting_len(), 1);
        assert_eq!(handler.confirmations(), vec![(C, dropped, false)]);
    }

    #[test]
    fn test_lost_completion_times_out() {
        let (mut node, transport, clock, _) = test_node(NodeConfig::default());
        node.send_unicast(&[1], B, false).unwrap();
        node.maintenance();

        clock.advance(50);
        node.maintenance();
        assert_eq!(transport.sent().len(), 1);

        clock.advance(1);
        node.maintenance();
        assert_eq!(transport.sent().len(), 2);
        assert_eq!(node.stats().send_failures, 1);
    }

    #[test]
    fn test_refused_send_counts_as_attempt() {
        let (mut node, transport, _, _) = test_node(NodeConfig::default());
        transport.set_refuse(true);
        node.send_broadcast(&[1]).unwrap();

        node.maintenance();
        node.maintenance();
        assert_eq!(node.stats().send_failures, 2);
        assert_eq!(node.outgoing_len(), 1);

        node.maintenance();
        assert_eq!(node.outgoing_len(), 0);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_stale_completion_ignored() {
        let (mut node, transport, ..) = test_node(NodeConfig::default());
        node.on_send_complete(false);
        node.send_broadcast(&[1]).unwrap();
        node.maintenance();
        node.maintenance();
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(node.stats().send_failures, 0);
    }
}
