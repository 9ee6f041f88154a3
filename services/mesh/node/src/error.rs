//! Error types for the mesh node

use mesh_storage::PoolError;
use mesh_wire::{NodeId, WireError};
use thiserror::Error;

/// Failure reported synchronously by a [`Transport`](crate::Transport)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    /// Create a transport error from any message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Mesh node errors
///
/// Protocol-level outcomes (lost acknowledgements, unknown routes, replays)
/// are never reported here; they surface through
/// [`MeshHandler::on_confirm`](crate::MeshHandler::on_confirm) or are logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// A tunable was set outside its accepted range
    #[error("{name} = {value} is out of range {min}..={max}")]
    OutOfRange {
        /// Name of the setting
        name: &'static str,
        /// Rejected value
        value: u64,
        /// Smallest accepted value
        min: u64,
        /// Largest accepted value
        max: u64,
    },
    /// Configuration that is not a simple range violation
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Unicast addressed to this node or to the broadcast address
    #[error("invalid unicast destination {0}")]
    InvalidDestination(NodeId),
    /// Packet encoding failure
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    /// No buffer for the request
    #[error("buffer pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Check that `value` lies in `min..=max`
pub(crate) fn check_range(name: &'static str, value: u64, min: u64, max: u64) -> Result<(), MeshError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(MeshError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}
