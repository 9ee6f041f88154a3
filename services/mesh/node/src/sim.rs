//! In-process radio medium for tests and the simulator binary.
//!
//! Nodes attached to a [`SimMedium`] hear each other only across explicit
//! links. Frames handed to a [`SimTransport`] stay in flight until
//! [`SimMedium::pump`] delivers them and reports the completion back to the
//! sender, which mimics a radio whose send callback fires some time after the
//! send call returned.

use crate::clock::Clock;
use crate::config::NodeConfig;
use crate::error::{MeshError, TransportError};
use crate::handler::MeshHandler;
use crate::node::MeshNode;
use crate::receive::ReceiveHandle;
use crate::transport::Transport;
use mesh_wire::{NodeId, Packet};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// A frame that went through the medium
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// Transmitting node
    pub from: NodeId,
    /// Next hop the frame was addressed to
    pub to: NodeId,
    /// Decoded contents
    pub packet: Packet,
    /// Whether the transmitter was told the send succeeded
    pub success: bool,
    /// Nodes that heard the frame
    pub heard_by: usize,
}

struct InFlight {
    from: NodeId,
    to: NodeId,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct MediumState {
    nodes: HashMap<NodeId, ReceiveHandle>,
    links: HashSet<(NodeId, NodeId)>,
    in_flight: Vec<InFlight>,
    log: Vec<FrameRecord>,
}

impl MediumState {
    fn linked(&self, a: NodeId, b: NodeId) -> bool {
        self.links.contains(&link_key(a, b))
    }
}

fn link_key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Shared simulated radio medium
#[derive(Clone, Default)]
pub struct SimMedium {
    state: Arc<Mutex<MediumState>>,
}

impl SimMedium {
    /// Create an empty medium
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MediumState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transport for a node with identifier `id`
    pub fn transport(&self, id: NodeId) -> SimTransport {
        SimTransport {
            id,
            medium: self.clone(),
            peers: BTreeSet::new(),
        }
    }

    /// Make a node reachable through its receive handle
    pub fn register(&self, handle: ReceiveHandle) {
        self.lock().nodes.insert(handle.node_id(), handle);
    }

    /// Build a node on this medium and register it
    pub fn add_node<C: Clock>(
        &self,
        id: NodeId,
        config: NodeConfig,
        clock: C,
    ) -> Result<MeshNode<SimTransport, C>, MeshError> {
        let node = MeshNode::new(id, config, self.transport(id), clock)?;
        self.register(node.receive_handle());
        Ok(node)
    }

    /// Let `a` and `b` hear each other
    pub fn link(&self, a: NodeId, b: NodeId) {
        self.lock().links.insert(link_key(a, b));
    }

    /// Cut the link between `a` and `b`
    pub fn unlink(&self, a: NodeId, b: NodeId) {
        self.lock().links.remove(&link_key(a, b));
    }

    /// Link consecutive nodes of `ids` into a line
    pub fn chain(&self, ids: &[NodeId]) {
        for pair in ids.windows(2) {
            self.link(pair[0], pair[1]);
        }
    }

    /// Whether `a` and `b` hear each other
    pub fn linked(&self, a: NodeId, b: NodeId) -> bool {
        self.lock().linked(a, b)
    }

    /// Frames handed over but not yet delivered
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Deliver every frame in flight and report completions to the senders
    ///
    /// Broadcasts reach every linked node and always succeed. A unicast
    /// succeeds only when its next hop is linked to the sender.
    pub fn pump(&self) -> usize {
        let (frames, nodes, links) = {
            let mut state = self.lock();
            let frames = std::mem::take(&mut state.in_flight);
            (frames, state.nodes.clone(), state.links.clone())
        };
        let linked = |a: NodeId, b: NodeId| links.contains(&link_key(a, b));

        let mut records = Vec::with_capacity(frames.len());
        for frame in &frames {
            let receivers: Vec<&ReceiveHandle> = if frame.to.is_broadcast() {
                nodes
                    .iter()
                    .filter(|(id, _)| **id != frame.from && linked(frame.from, **id))
                    .map(|(_, handle)| handle)
                    .collect()
            } else {
                nodes
                    .get(&frame.to)
                    .filter(|_| linked(frame.from, frame.to))
                    .into_iter()
                    .collect()
            };
            let success = frame.to.is_broadcast() || !receivers.is_empty();

            for handle in &receivers {
                let admission = handle.on_receive(&frame.bytes, frame.from);
                trace!("{} -> {}: {:?}", frame.from, handle.node_id(), admission);
            }
            if let Some(sender) = nodes.get(&frame.from) {
                sender.on_send_complete(success);
            }

            if let Ok(packet) = Packet::decode(&frame.bytes) {
                records.push(FrameRecord {
                    from: frame.from,
                    to: frame.to,
                    packet,
                    success,
                    heard_by: receivers.len(),
                });
            }
        }

        let delivered = frames.len();
        self.lock().log.extend(records);
        delivered
    }

    /// Every frame delivered so far, in order
    pub fn frames(&self) -> Vec<FrameRecord> {
        self.lock().log.clone()
    }

    /// Forget the frame log
    pub fn clear_log(&self) {
        self.lock().log.clear();
    }
}

impl std::fmt::Debug for SimMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SimMedium")
            .field("nodes", &state.nodes.len())
            .field("links", &state.links.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

/// [`Transport`] endpoint of one node on a [`SimMedium`]
#[derive(Debug)]
pub struct SimTransport {
    id: NodeId,
    medium: SimMedium,
    peers: BTreeSet<NodeId>,
}

impl SimTransport {
    /// Peers currently registered by the node
    pub fn peers(&self) -> Vec<NodeId> {
        self.peers.iter().copied().collect()
    }
}

impl Transport for SimTransport {
    fn send(&mut self, frame: &[u8], next_hop: NodeId) -> Result<(), TransportError> {
        if !next_hop.is_broadcast() && !self.peers.contains(&next_hop) {
            return Err(TransportError::new(format!("{} is not a registered peer", next_hop)));
        }
        self.medium.lock().in_flight.push(InFlight {
            from: self.id,
            to: next_hop,
            bytes: frame.to_vec(),
        });
        Ok(())
    }

    fn add_peer(&mut self, peer: NodeId) -> Result<(), TransportError> {
        self.peers.insert(peer);
        Ok(())
    }

    fn remove_peer(&mut self, peer: NodeId) {
        self.peers.remove(&peer);
    }
}

/// Upward callback captured by [`RecordingHandler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    /// A broadcast arrived
    Broadcast {
        /// De-obfuscated payload
        payload: Vec<u8>,
        /// Original sender
        sender: NodeId,
    },
    /// A unicast for this node arrived
    Unicast {
        /// De-obfuscated payload
        payload: Vec<u8>,
        /// Original sender
        sender: NodeId,
    },
    /// Delivery outcome of a local send
    Confirm {
        /// Destination of the send
        destination: NodeId,
        /// Its message ID
        message_id: u16,
        /// Outcome
        delivered: bool,
    },
}

/// Handler that stores every callback; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<MeshEvent>>>,
}

impl RecordingHandler {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MeshEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Events recorded so far
    pub fn events(&self) -> Vec<MeshEvent> {
        self.lock().clone()
    }

    /// Remove and return the recorded events
    pub fn drain(&self) -> Vec<MeshEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Recorded confirmations as `(destination, message_id, delivered)`
    pub fn confirmations(&self) -> Vec<(NodeId, u16, bool)> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                MeshEvent::Confirm {
                    destination,
                    message_id,
                    delivered,
                } => Some((*destination, *message_id, *delivered)),
                _ => None,
            })
            .collect()
    }
}

impl MeshHandler for RecordingHandler {
    fn on_broadcast_received(&mut self, payload: &[u8], sender: NodeId) {
        self.lock().push(MeshEvent::Broadcast {
            payload: payload.to_vec(),
            sender,
        });
    }

    fn on_unicast_received(&mut self, payload: &[u8], sender: NodeId) {
        self.lock().push(MeshEvent::Unicast {
            payload: payload.to_vec(),
            sender,
        });
    }

    fn on_confirm(&mut self, destination: NodeId, message_id: u16, delivered: bool) {
        self.lock().push(MeshEvent::Confirm {
            destination,
            message_id,
            delivered,
        });
    }
}
