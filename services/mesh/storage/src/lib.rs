//! Fixed-capacity buffer pool and replay suppression window for mesh.
//!
//! This crate provides the memory layer of a mesh node: a pool of
//! pre-allocated slots that every in-flight packet record lives in, and the
//! short window of recently seen message IDs used to drop duplicates heard
//! over several paths.
//!
//! ## Features
//!
//! - **No heap growth**: all slots are allocated once, when the pool is built
//! - **Move-only handles**: a [`PoolBox`] returns its slot when dropped, exactly once
//! - **Back-pressure**: an empty pool is an ordinary [`PoolError`], never a panic
//! - **Priority mode**: a reserve of slots kept for control traffic
//! - **Replay window**: fixed ring of the last ten message IDs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pool;
pub mod replay;

use thiserror::Error;

pub use pool::{
    BufferPool, PoolBox, Priority, Record, DEFAULT_CAPACITY, DEFAULT_THRESHOLD, MAX_SLOT_SIZE,
};
pub use replay::{ReplayWindow, REPLAY_WINDOW_LEN};

/// Buffer pool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot is handed out
    #[error("buffer pool exhausted")]
    Exhausted,
    /// Remaining slots are reserved for important traffic
    #[error("buffer pool below reserve: {free} free, {reserve} reserved")]
    Reserved {
        /// Slots still free
        free: usize,
        /// Reserve threshold
        reserve: usize,
    },
}
