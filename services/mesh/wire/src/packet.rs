//! The routed packet and its fixed byte layout.

use crate::node_id::{NetName, NodeId, NET_NAME_SIZE, NODE_ID_LEN};
use crate::WireError;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum payload carried by one packet
pub const MAX_PAYLOAD: usize = 200;

/// Hop budget stamped by the originator
pub const DEFAULT_TTL: u8 = 5;

/// Encoded size of every packet on the wire
pub const PACKET_SIZE: usize = 1 + 1 + 2 + NET_NAME_SIZE + NODE_ID_LEN * 2 + 1 + MAX_PAYLOAD;

/// Message types as defined in the wire protocol
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Flooded to every node, relayed while TTL lasts
    #[default]
    Broadcast = 1,
    /// Routed to one node, no acknowledgement
    Unicast = 2,
    /// Routed to one node, target answers with a delivery confirmation
    UnicastWithConfirm = 3,
    /// Acknowledgement for a `UnicastWithConfirm`, payload is the message ID
    DeliveryConfirmResponse = 4,
    /// Route discovery flood looking for `original_target`
    SearchRequest = 5,
    /// Answer to a route discovery, flooded back toward the requester
    SearchResponse = 6,
}

impl MessageType {
    /// Whether the packet travels toward one destination along learned routes
    pub fn is_routed(self) -> bool {
        matches!(
            self,
            MessageType::Unicast
                | MessageType::UnicastWithConfirm
                | MessageType::DeliveryConfirmResponse
        )
    }

    /// Whether the packet is protocol control traffic rather than application data
    pub fn is_control(self) -> bool {
        matches!(
            self,
            MessageType::DeliveryConfirmResponse
                | MessageType::SearchRequest
                | MessageType::SearchResponse
        )
    }

    /// Upper-case name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Broadcast => "BROADCAST",
            MessageType::Unicast => "UNICAST",
            MessageType::UnicastWithConfirm => "UNICAST_WITH_CONFIRM",
            MessageType::DeliveryConfirmResponse => "DELIVERY_CONFIRM_RESPONSE",
            MessageType::SearchRequest => "SEARCH_REQUEST",
            MessageType::SearchResponse => "SEARCH_RESPONSE",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Broadcast),
            2 => Ok(MessageType::Unicast),
            3 => Ok(MessageType::UnicastWithConfirm),
            4 => Ok(MessageType::DeliveryConfirmResponse),
            5 => Ok(MessageType::SearchRequest),
            6 => Ok(MessageType::SearchResponse),
            _ => Err(WireError::Type(value)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routed message as transmitted between nodes
///
/// `original_target` and `original_sender` are end-to-end and never rewritten
/// by intermediate hops.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Message type
    pub message_type: MessageType,
    /// Random per-originator ID used for dedup and confirmation matching
    pub message_id: u16,
    /// Network label of the originator
    pub net_name: NetName,
    /// End-to-end destination
    pub original_target: NodeId,
    /// End-to-end source
    pub original_sender: NodeId,
    /// Remaining hop budget
    pub ttl: u8,
    len: u8,
    body: [u8; MAX_PAYLOAD],
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            message_type: MessageType::default(),
            message_id: 0,
            net_name: NetName::ANY,
            original_target: NodeId::default(),
            original_sender: NodeId::default(),
            ttl: 0,
            len: 0,
            body: [0; MAX_PAYLOAD],
        }
    }
}

impl Packet {
    /// Create a packet with the originator's TTL and the given payload
    pub fn new(
        message_type: MessageType,
        message_id: u16,
        original_target: NodeId,
        original_sender: NodeId,
        payload: &[u8],
    ) -> Result<Self, WireError> {
        let mut packet = Self {
            message_type,
            message_id,
            original_target,
            original_sender,
            ttl: DEFAULT_TTL,
            ..Self::default()
        };
        packet.set_payload(payload)?;
        Ok(packet)
    }

    /// Payload length in bytes
    pub fn message_size(&self) -> usize {
        self.len as usize
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.body[..self.len as usize]
    }

    /// Mutable payload bytes, for in-place obfuscation
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.body[..self.len as usize]
    }

    /// Replace the payload
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<(), WireError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(payload.len()));
        }
        self.body[..payload.len()].copy_from_slice(payload);
        self.body[payload.len()..].fill(0);
        self.len = payload.len() as u8;
        Ok(())
    }

    /// Consume one hop of the TTL, returning `false` if it was already exhausted
    pub fn decrement_ttl(&mut self) -> bool {
        if self.ttl == 0 {
            return false;
        }
        self.ttl -= 1;
        true
    }

    /// Encode the packet into its fixed wire layout
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.message_type as u8);
        buf.put_u8(self.len);
        buf.put_u16_le(self.message_id);
        buf.put_slice(self.net_name.as_raw());
        buf.put_slice(self.original_target.as_bytes());
        buf.put_slice(self.original_sender.as_bytes());
        buf.put_u8(self.ttl);
        buf.put_slice(&self.body);
    }

    /// Encode into a stack buffer ready to hand to the transport
    pub fn to_bytes(&self) -> [u8; PACKET_SIZE] {
        let mut out = [0u8; PACKET_SIZE];
        let mut cursor = &mut out[..];
        self.encode(&mut cursor);
        out
    }

    /// Decode a datagram, which must be exactly [`PACKET_SIZE`] bytes
    pub fn decode(mut buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() != PACKET_SIZE {
            return Err(WireError::Size(buf.len()));
        }

        let message_type = MessageType::try_from(buf.get_u8())?;
        let len = buf.get_u8();
        if len as usize > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(len as usize));
        }
        let message_id = buf.get_u16_le();

        let mut net = [0u8; NET_NAME_SIZE];
        buf.copy_to_slice(&mut net);
        let mut target = [0u8; NODE_ID_LEN];
        buf.copy_to_slice(&mut target);
        let mut sender = [0u8; NODE_ID_LEN];
        buf.copy_to_slice(&mut sender);
        let ttl = buf.get_u8();
        let mut body = [0u8; MAX_PAYLOAD];
        buf.copy_to_slice(&mut body);

        Ok(Self {
            message_type,
            message_id,
            net_name: NetName::from_raw(net),
            original_target: NodeId(target),
            original_sender: NodeId(sender),
            ttl,
            len,
            body,
        })
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("message_type", &self.message_type)
            .field("message_id", &self.message_id)
            .field("net_name", &self.net_name)
            .field("original_target", &self.original_target)
            .field("original_sender", &self.original_sender)
            .field("ttl", &self.ttl)
            .field("payload", &self.payload())
            .finish()
    }
}
