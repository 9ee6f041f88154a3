//! Upward callbacks into the application.

use mesh_wire::NodeId;

/// Receives application traffic and delivery outcomes from a node
///
/// All methods run inside [`MeshNode::maintenance`](crate::MeshNode::maintenance)
/// and default to doing nothing.
pub trait MeshHandler: Send {
    /// A broadcast reached this node; `payload` is already de-obfuscated
    fn on_broadcast_received(&mut self, payload: &[u8], sender: NodeId) {
        let _ = (payload, sender);
    }

    /// A unicast addressed to this node arrived; `payload` is already de-obfuscated
    fn on_unicast_received(&mut self, payload: &[u8], sender: NodeId) {
        let _ = (payload, sender);
    }

    /// Final outcome of a locally originated broadcast or confirmed unicast
    ///
    /// Fired exactly once per such message. For broadcasts `destination` is
    /// [`NodeId::BROADCAST`] and `delivered` only means the frame left the radio.
    fn on_confirm(&mut self, destination: NodeId, message_id: u16, delivered: bool) {
        let _ = (destination, message_id, delivered);
    }
}
