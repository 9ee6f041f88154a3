//! Shared fixtures for unit tests.

use crate::clock::ManualClock;
use crate::config::NodeConfig;
use crate::error::TransportError;
use crate::node::MeshNode;
use crate::sim::RecordingHandler;
use crate::transport::Transport;
use mesh_wire::{NodeId, Packet, PACKET_SIZE};
use std::sync::{Arc, Mutex};

pub(crate) const LOCAL: NodeId = NodeId::new([0xAA; 6]);
pub(crate) const B: NodeId = NodeId::new([0xBB; 6]);
pub(crate) const C: NodeId = NodeId::new([0xCC; 6]);

/// Records frames and peer calls; completions are reported by the test
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    pub(crate) sent: Arc<Mutex<Vec<(NodeId, Packet)>>>,
    pub(crate) peers: Arc<Mutex<Vec<NodeId>>>,
    pub(crate) refuse: Arc<Mutex<bool>>,
}

impl ScriptedTransport {
    pub(crate) fn sent(&self) -> Vec<(NodeId, Packet)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn peers(&self) -> Vec<NodeId> {
        self.peers.lock().unwrap().clone()
    }

    pub(crate) fn set_refuse(&self, refuse: bool) {
        *self.refuse.lock().unwrap() = refuse;
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, frame: &[u8], next_hop: NodeId) -> Result<(), TransportError> {
        if *self.refuse.lock().unwrap() {
            return Err(TransportError::new("radio off"));
        }
        assert_eq!(frame.len(), PACKET_SIZE);
        self.sent
            .lock()
            .unwrap()
            .push((next_hop, Packet::decode(frame).unwrap()));
        Ok(())
    }

    fn add_peer(&mut self, peer: NodeId) -> Result<(), TransportError> {
        let mut peers = self.peers.lock().unwrap();
        if !peers.contains(&peer) {
            peers.push(peer);
        }
        Ok(())
    }

    fn remove_peer(&mut self, peer: NodeId) {
        self.peers.lock().unwrap().retain(|p| *p != peer);
    }
}

pub(crate) type TestNode = MeshNode<ScriptedTransport, ManualClock>;

pub(crate) fn test_node(
    config: NodeConfig,
) -> (TestNode, ScriptedTransport, ManualClock, RecordingHandler) {
    let transport = ScriptedTransport::default();
    let clock = ManualClock::new();
    let handler = RecordingHandler::new();
    let config = NodeConfig {
        rng_seed: Some(7),
        ..config
    };
    let mut node = MeshNode::new(LOCAL, config, transport.clone(), clock.clone()).unwrap();
    node.set_handler(handler.clone());
    (node, transport, clock, handler)
}
