//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Datagram length does not match the fixed packet size
    #[error("datagram size mismatch: {0}")]
    Size(usize),

    /// Unknown message type byte
    #[error("unknown message type {0}")]
    Type(u8),

    /// Payload longer than a single packet can carry
    #[error("payload too large: {0}")]
    PayloadTooLarge(usize),

    /// Network label longer than the wire field
    #[error("network name too long: {0}")]
    NetNameTooLong(usize),

    /// Obfuscation key longer than allowed
    #[error("crypt key too long: {0}")]
    KeyTooLong(usize),

    /// Node identifier text could not be parsed
    #[error("invalid node id: {0}")]
    NodeId(String),
}
