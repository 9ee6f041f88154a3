//! Receive-side admission and send completion.
//!
//! This is the only part of a node that runs outside the maintenance tick. The
//! transport calls it from whatever context delivers datagrams, so nothing
//! here blocks: a busy guard or an empty pool drops the datagram.

use crate::slot::{IncomingBox, PacketPool};
use mesh_storage::{Priority, ReplayWindow};
use mesh_wire::{IncomingRecord, NetName, NodeId, Packet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::{debug, warn};

/// What happened to a datagram offered to [`ReceiveHandle::on_receive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queued for the next maintenance tick
    Queued,
    /// Wrong size or undecodable
    Malformed,
    /// Our own packet relayed back to us
    OwnEcho,
    /// Different network label
    ForeignNetwork,
    /// Message ID seen recently
    Duplicate,
    /// Another receive was in progress
    Busy,
    /// Buffer pool empty
    NoBuffer,
}

#[derive(Default)]
struct Inbox {
    queue: VecDeque<IncomingBox>,
    seen: ReplayWindow,
}

#[derive(Default)]
pub(crate) struct ReceiveCounters {
    pub(crate) received: AtomicU64,
    pub(crate) foreign: AtomicU64,
    pub(crate) duplicate: AtomicU64,
    pub(crate) busy: AtomicU64,
    pub(crate) no_buffer: AtomicU64,
}

pub(crate) struct ReceiveShared {
    local: NodeId,
    net_name: NetName,
    pool: PacketPool,
    inbox: Mutex<Inbox>,
    send_done: AtomicBool,
    send_ok: AtomicBool,
    pub(crate) counters: ReceiveCounters,
}

impl ReceiveShared {
    pub(crate) fn new(local: NodeId, net_name: NetName, pool: PacketPool) -> Self {
        Self {
            local,
            net_name,
            pool,
            inbox: Mutex::new(Inbox::default()),
            send_done: AtomicBool::new(false),
            send_ok: AtomicBool::new(false),
            counters: ReceiveCounters::default(),
        }
    }

    fn lock_inbox(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next received record, oldest first
    pub(crate) fn pop_incoming(&self) -> Option<IncomingBox> {
        self.lock_inbox().queue.pop_front()
    }

    pub(crate) fn incoming_len(&self) -> usize {
        self.lock_inbox().queue.len()
    }

    /// Outcome of the last send, if its completion has arrived
    pub(crate) fn take_completion(&self) -> Option<bool> {
        if self.send_done.swap(false, Ordering::AcqRel) {
            Some(self.send_ok.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Forget any stale completion before a new send
    pub(crate) fn clear_completion(&self) {
        self.send_done.store(false, Ordering::Release);
    }
}

/// Cloneable entry point the transport feeds a node through
#[derive(Clone)]
pub struct ReceiveHandle {
    shared: Arc<ReceiveShared>,
}

impl ReceiveHandle {
    pub(crate) fn new(shared: Arc<ReceiveShared>) -> Self {
        Self { shared }
    }

    /// Identifier of the node behind this handle
    pub fn node_id(&self) -> NodeId {
        self.shared.local
    }

    /// Offer an inbound datagram heard from `immediate_sender`
    pub fn on_receive(&self, data: &[u8], immediate_sender: NodeId) -> Admission {
        let shared = &*self.shared;

        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping datagram from {}: {}", immediate_sender, e);
                shared.counters.foreign.fetch_add(1, Ordering::Relaxed);
                return Admission::Malformed;
            }
        };
        if packet.original_sender == shared.local {
            shared.counters.foreign.fetch_add(1, Ordering::Relaxed);
            return Admission::OwnEcho;
        }
        if !shared.net_name.admits(&packet.net_name) {
            debug!(
                "Dropping packet {} from network {:?}",
                packet.message_id, packet.net_name
            );
            shared.counters.foreign.fetch_add(1, Ordering::Relaxed);
            return Admission::ForeignNetwork;
        }

        let mut inbox = match shared.inbox.try_lock() {
            Ok(inbox) => inbox,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Receive path busy, dropping packet {}", packet.message_id);
                shared.counters.busy.fetch_add(1, Ordering::Relaxed);
                return Admission::Busy;
            }
        };

        if inbox.seen.contains(packet.message_id) {
            shared.counters.duplicate.fetch_add(1, Ordering::Relaxed);
            return Admission::Duplicate;
        }

        let priority = if packet.message_type.is_control() {
            Priority::Important
        } else {
            Priority::Normal
        };
        let mut record: IncomingBox = match shared.pool.take_with(priority) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "Dropping {} {} from {}: {}",
                    packet.message_type, packet.message_id, immediate_sender, e
                );
                shared.counters.no_buffer.fetch_add(1, Ordering::Relaxed);
                return Admission::NoBuffer;
            }
        };

        inbox.seen.record(packet.message_id);
        *record = IncomingRecord::new(immediate_sender, packet);
        inbox.queue.push_back(record);
        shared.counters.received.fetch_add(1, Ordering::Relaxed);
        Admission::Queued
    }

    /// Report the outcome of the frame most recently handed to the transport
    pub fn on_send_complete(&self, success: bool) {
        self.shared.send_ok.store(success, Ordering::Release);
        self.shared.send_done.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for ReceiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveHandle")
            .field("node_id", &self.shared.local)
            .finish()
    }
}
