//! Node identifiers and network labels.

use crate::WireError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a node identifier in bytes
pub const NODE_ID_LEN: usize = 6;

/// Size of the network label field in bytes
pub const NET_NAME_SIZE: usize = 20;

/// 6-byte link-layer address naming a radio endpoint
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(pub [u8; NODE_ID_LEN]);

impl NodeId {
    /// Flood destination understood by every transport
    pub const BROADCAST: NodeId = NodeId([0xFF; NODE_ID_LEN]);

    /// Create a node identifier from raw bytes
    pub const fn new(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of the identifier
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Whether this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; NODE_ID_LEN]> for NodeId {
    fn from(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Accepts `AA:BB:CC:DD:EE:FF`, `AA-BB-CC-DD-EE-FF` and bare `AABBCCDDEEFF`,
/// in either case.
impl FromStr for NodeId {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: Vec<u8> = s
            .bytes()
            .filter(|c| *c != b':' && *c != b'-')
            .collect();
        if digits.len() != NODE_ID_LEN * 2 {
            return Err(WireError::NodeId(s.to_string()));
        }

        let mut bytes = [0u8; NODE_ID_LEN];
        for (i, pair) in digits.chunks(2).enumerate() {
            let hi = hex_value(pair[0]).ok_or_else(|| WireError::NodeId(s.to_string()))?;
            let lo = hex_value(pair[1]).ok_or_else(|| WireError::NodeId(s.to_string()))?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Network segmentation label carried in every packet
///
/// Zero padded to [`NET_NAME_SIZE`]; an all-zero label means "accept any network".
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq)]
pub struct NetName([u8; NET_NAME_SIZE]);

impl NetName {
    /// Label that matches every network
    pub const ANY: NetName = NetName([0; NET_NAME_SIZE]);

    /// Create a label from text, rejecting anything longer than the wire field
    pub fn new(name: &str) -> Result<Self, WireError> {
        let bytes = name.as_bytes();
        if bytes.len() > NET_NAME_SIZE {
            return Err(WireError::NetNameTooLong(bytes.len()));
        }
        let mut raw = [0u8; NET_NAME_SIZE];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(raw))
    }

    /// Rebuild a label from its wire bytes
    pub fn from_raw(raw: [u8; NET_NAME_SIZE]) -> Self {
        Self(raw)
    }

    /// Wire bytes of the label
    pub fn as_raw(&self) -> &[u8; NET_NAME_SIZE] {
        &self.0
    }

    /// Whether the label is empty
    pub fn is_any(&self) -> bool {
        self.0[0] == 0
    }

    /// Whether a packet carrying `remote` is admitted by a node configured with `self`
    pub fn admits(&self, remote: &NetName) -> bool {
        self.is_any() || self == remote
    }

    /// Label text up to the first NUL
    pub fn as_str(&self) -> String {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(NET_NAME_SIZE);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Debug for NetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetName({:?})", self.as_str())
    }
}

impl fmt::Display for NetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}
