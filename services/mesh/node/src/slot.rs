//! What a pool slot can hold.

use mesh_storage::{BufferPool, PoolBox, Record};
use mesh_wire::{
    IncomingRecord, OutgoingRecord, WaitingRecord, INCOMING_RECORD_LEN, OUTGOING_RECORD_LEN,
    WAITING_RECORD_LEN,
};

/// Contents of one buffer pool slot
#[derive(Debug, Default)]
pub enum PacketSlot {
    /// Owned by the pool
    #[default]
    Free,
    /// Queued for transmission
    Outgoing(OutgoingRecord),
    /// Received, waiting for dispatch
    Incoming(IncomingRecord),
    /// Parked until a route is discovered
    Waiting(WaitingRecord),
}

impl PacketSlot {
    fn kind(&self) -> &'static str {
        match self {
            PacketSlot::Free => "free",
            PacketSlot::Outgoing(_) => "outgoing",
            PacketSlot::Incoming(_) => "incoming",
            PacketSlot::Waiting(_) => "waiting",
        }
    }
}

/// Pool of packet slots shared by the receive path and the maintenance tick
pub type PacketPool = BufferPool<PacketSlot>;
/// Owned outgoing record
pub type OutgoingBox = PoolBox<OutgoingRecord, PacketSlot>;
/// Owned incoming record
pub type IncomingBox = PoolBox<IncomingRecord, PacketSlot>;
/// Owned waiting-for-route record
pub type WaitingBox = PoolBox<WaitingRecord, PacketSlot>;

macro_rules! slot_record {
    ($record:ty, $variant:ident, $len:expr) => {
        impl Record<PacketSlot> for $record {
            const MAX_LEN: usize = $len;

            fn store(self, slot: &mut PacketSlot) {
                *slot = PacketSlot::$variant(self);
            }

            fn view(slot: &PacketSlot) -> &Self {
                match slot {
                    PacketSlot::$variant(record) => record,
                    other => panic!(
                        "pool slot holds a {} record, expected {}",
                        other.kind(),
                        stringify!($variant)
                    ),
                }
            }

            fn view_mut(slot: &mut PacketSlot) -> &mut Self {
                match slot {
                    PacketSlot::$variant(record) => record,
                    other => panic!(
                        "pool slot holds a {} record, expected {}",
                        other.kind(),
                        stringify!($variant)
                    ),
                }
            }
        }
    };
}

slot_record!(OutgoingRecord, Outgoing, OUTGOING_RECORD_LEN);
slot_record!(IncomingRecord, Incoming, INCOMING_RECORD_LEN);
slot_record!(WaitingRecord, Waiting, WAITING_RECORD_LEN);
