//! Pre-allocated slot arena with move-only handles.
//!
//! Slots circulate through a ring: [`BufferPool::take_with`] removes the
//! oldest free slot at the tail, dropping a [`PoolBox`] puts it back at the
//! head. The ring is the only structure touched from both the receive context
//! and the maintenance tick, so every index update happens under one short
//! mutex that is never held across anything else.

use crate::PoolError;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Largest record, in encoded bytes, that fits in a slot
pub const MAX_SLOT_SIZE: usize = 261;

/// Default number of slots
pub const DEFAULT_CAPACITY: usize = 500;

/// Default reserve kept for important traffic in priority mode
pub const DEFAULT_THRESHOLD: usize = 5;

/// A record kind that can live inside a slot of type `S`
///
/// `S` is usually an enum with one variant per record kind. `view` and
/// `view_mut` are only called on slots this kind has just been stored into, so
/// finding another variant there is a bug and must panic.
pub trait Record<S>: Default + Sized {
    /// Encoded upper bound of the record
    const MAX_LEN: usize;

    /// Move the record into a slot, replacing whatever was there
    fn store(self, slot: &mut S);

    /// Borrow the record stored in a slot
    fn view(slot: &S) -> &Self;

    /// Mutably borrow the record stored in a slot
    fn view_mut(slot: &mut S) -> &mut Self;
}

/// Request priority when priority mode is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Fails once the free count drops under the reserve
    Normal,
    /// May drain the pool down to zero
    Important,
}

struct Ring<S> {
    slots: Vec<Option<Box<S>>>,
    head: usize,
    tail: usize,
    free: usize,
}

impl<S> Ring<S> {
    fn next(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }

    fn pop(&mut self) -> Option<Box<S>> {
        if self.free == 0 {
            return None;
        }
        let slot = match self.slots[self.tail].take() {
            Some(slot) => slot,
            None => panic!(
                "buffer pool corrupted: slot {} empty with {} free",
                self.tail, self.free
            ),
        };
        self.tail = self.next(self.tail);
        self.free -= 1;
        Some(slot)
    }

    fn push(&mut self, slot: Box<S>) {
        if self.free >= self.slots.len() || self.slots[self.head].is_some() {
            panic!(
                "buffer returned to a full pool: head {} with {} of {} free",
                self.head,
                self.free,
                self.slots.len()
            );
        }
        self.slots[self.head] = Some(slot);
        self.head = self.next(self.head);
        self.free += 1;
    }
}

struct Shared<S> {
    ring: Mutex<Ring<S>>,
    capacity: usize,
    reserve: Option<usize>,
}

impl<S> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, Ring<S>> {
        // A panic while holding the lock is already fatal for the pool's
        // invariants; the indices themselves are still consistent.
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-capacity pool of slots of type `S`
///
/// Cloning the pool clones a handle; all clones share the same slots.
pub struct BufferPool<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for BufferPool<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Default> BufferPool<S> {
    /// Create a pool with `capacity` pre-allocated slots
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Create a pool in priority mode, keeping `reserve` slots for important requests
    pub fn with_reserve(capacity: usize, reserve: usize) -> Self {
        Self::build(capacity, Some(reserve))
    }

    fn build(capacity: usize, reserve: Option<usize>) -> Self {
        assert!(capacity > 0, "buffer pool needs at least one slot");
        let slots = (0..capacity).map(|_| Some(Box::new(S::default()))).collect();
        Self {
            shared: Arc::new(Shared {
                ring: Mutex::new(Ring {
                    slots,
                    head: 0,
                    tail: 0,
                    free: capacity,
                }),
                capacity,
                reserve,
            }),
        }
    }
}

impl<S> BufferPool<S> {
    /// Take a slot for a normal-priority record of kind `T`
    pub fn take<T: Record<S>>(&self) -> Result<PoolBox<T, S>, PoolError> {
        self.take_with(Priority::Normal)
    }

    /// Take a slot for a record of kind `T`, initialised to `T::default()`
    pub fn take_with<T: Record<S>>(&self, priority: Priority) -> Result<PoolBox<T, S>, PoolError> {
        assert!(
            T::MAX_LEN <= MAX_SLOT_SIZE,
            "record kind of {} bytes does not fit a {} byte slot",
            T::MAX_LEN,
            MAX_SLOT_SIZE
        );

        let mut slot = {
            let mut ring = self.shared.lock();
            if let (Some(reserve), Priority::Normal) = (self.shared.reserve, priority) {
                if ring.free < reserve {
                    return Err(PoolError::Reserved {
                        free: ring.free,
                        reserve,
                    });
                }
            }
            ring.pop().ok_or(PoolError::Exhausted)?
        };

        T::default().store(&mut slot);
        trace!("pool take, {} free", self.available());
        Ok(PoolBox {
            slot: Some(slot),
            pool: Arc::clone(&self.shared),
            _kind: PhantomData,
        })
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.shared.lock().free
    }

    /// Slots currently handed out
    pub fn outstanding(&self) -> usize {
        self.shared.capacity - self.available()
    }

    /// Reserve threshold when priority mode is enabled
    pub fn reserve(&self) -> Option<usize> {
        self.shared.reserve
    }
}

impl<S> fmt::Debug for BufferPool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.shared.capacity)
            .field("available", &self.available())
            .field("reserve", &self.shared.reserve)
            .finish()
    }
}

/// Exclusively owned slot holding a record of kind `T`
///
/// The slot goes back to its pool when the handle is dropped. There is no
/// other way to release it.
pub struct PoolBox<T, S> {
    slot: Option<Box<S>>,
    pool: Arc<Shared<S>>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Record<S>, S> PoolBox<T, S> {
    fn slot(&self) -> &S {
        match self.slot.as_deref() {
            Some(slot) => slot,
            None => unreachable!("pool box used after release"),
        }
    }

    fn slot_mut(&mut self) -> &mut S {
        match self.slot.as_deref_mut() {
            Some(slot) => slot,
            None => unreachable!("pool box used after release"),
        }
    }

    /// Reuse this slot for another record kind built from the current one
    pub fn recast<U: Record<S>>(mut self, build: impl FnOnce(&T) -> U) -> PoolBox<U, S> {
        assert!(U::MAX_LEN <= MAX_SLOT_SIZE, "record kind does not fit a slot");
        let value = build(&self);
        let mut slot = match self.slot.take() {
            Some(slot) => slot,
            None => unreachable!("pool box used after release"),
        };
        value.store(&mut slot);
        PoolBox {
            slot: Some(slot),
            pool: Arc::clone(&self.pool),
            _kind: PhantomData,
        }
    }
}

impl<T: Record<S>, S> Deref for PoolBox<T, S> {
    type Target = T;

    fn deref(&self) -> &T {
        T::view(self.slot())
    }
}

impl<T: Record<S>, S> DerefMut for PoolBox<T, S> {
    fn deref_mut(&mut self) -> &mut T {
        T::view_mut(self.slot_mut())
    }
}

impl<T, S> Drop for PoolBox<T, S> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.lock().push(slot);
        }
    }
}

impl<T: Record<S> + fmt::Debug, S> fmt::Debug for PoolBox<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
