//! Link-layer collaborator the node sends through.

use crate::error::TransportError;
use mesh_wire::NodeId;

/// Raw datagram transport underneath the mesh
///
/// `send` only hands the frame over. The outcome arrives later through
/// [`ReceiveHandle::on_send_complete`](crate::ReceiveHandle::on_send_complete),
/// exactly once per accepted frame. An `Err` from `send` means the frame was
/// never accepted and no completion will follow.
pub trait Transport: Send {
    /// Queue `frame` for transmission to `next_hop`, or to every neighbour
    /// when `next_hop` is [`NodeId::BROADCAST`]
    fn send(&mut self, frame: &[u8], next_hop: NodeId) -> Result<(), TransportError>;

    /// Register `peer` before sending to it
    fn add_peer(&mut self, peer: NodeId) -> Result<(), TransportError>;

    /// Forget `peer` once its frame has left the queue
    fn remove_peer(&mut self, peer: NodeId);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &[u8], next_hop: NodeId) -> Result<(), TransportError> {
        (**self).send(frame, next_hop)
    }

    fn add_peer(&mut self, peer: NodeId) -> Result<(), TransportError> {
        (**self).add_peer(peer)
    }

    fn remove_peer(&mut self, peer: NodeId) {
        (**self).remove_peer(peer)
    }
}
