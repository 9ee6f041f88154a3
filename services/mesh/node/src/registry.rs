//! Time-bounded registries swept by the maintenance tick.

use crate::slot::WaitingBox;
use mesh_wire::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Packets parked until route discovery finds their destination
///
/// Bounded; a full registry refuses new records and hands them back.
#[derive(Debug)]
pub struct WaitingRegistry {
    records: VecDeque<WaitingBox>,
    capacity: usize,
}

impl WaitingRegistry {
    /// Create a registry holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Park a record, or give it back if the registry is full
    pub fn park(&mut self, record: WaitingBox) -> Result<(), WaitingBox> {
        if self.records.len() >= self.capacity {
            return Err(record);
        }
        self.records.push_back(record);
        Ok(())
    }

    /// Remove and return every record for which `pick` returns `true`, in
    /// parking order
    pub fn drain_where(&mut self, mut pick: impl FnMut(&WaitingBox) -> bool) -> Vec<WaitingBox> {
        let mut picked = Vec::new();
        let mut i = 0;
        while i < self.records.len() {
            if !pick(&self.records[i]) {
                i += 1;
            } else if let Some(record) = self.records.remove(i) {
                picked.push(record);
            }
        }
        picked
    }

    /// Number of parked records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is parked
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether another record would be refused
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }
}

/// A confirmed unicast whose acknowledgement has not arrived yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    /// End-to-end destination of the unicast
    pub destination: NodeId,
    /// Message ID the acknowledgement must echo
    pub message_id: u16,
    /// Time the unicast left this node, in clock milliseconds
    pub sent_at_ms: u64,
}

/// Outstanding delivery confirmations
#[derive(Debug, Default)]
pub struct ConfirmationRegistry {
    entries: Vec<PendingConfirmation>,
}

impl ConfirmationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for an acknowledgement
    pub fn register(&mut self, destination: NodeId, message_id: u16, sent_at_ms: u64) {
        self.entries.push(PendingConfirmation {
            destination,
            message_id,
            sent_at_ms,
        });
    }

    /// Remove the entries matching an acknowledgement, returning whether any existed
    pub fn resolve(&mut self, destination: NodeId, message_id: u16) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.destination == destination && e.message_id == message_id));
        self.entries.len() != before
    }

    /// Remove and return entries older than `timeout_ms`
    pub fn expire(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<PendingConfirmation> {
        let mut expired = Vec::new();
        self.entries.retain(|e| {
            if now_ms.saturating_sub(e.sent_at_ms) > timeout_ms {
                expired.push(*e);
                false
            } else {
                true
            }
        });
        expired
    }

    /// Entries still waiting
    pub fn entries(&self) -> &[PendingConfirmation] {
        &self.entries
    }

    /// Number of entries still waiting
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
