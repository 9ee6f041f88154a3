//! Learned next-hop routing table and routing decisions for mesh.
//!
//! Routes are never computed. A node learns that `destination` is reachable
//! through `next_hop` by overhearing route discovery traffic, keeps at most one
//! entry per destination, and drops the entry when a send through it keeps
//! failing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod next_hop;
pub mod router;
pub mod table;

pub use next_hop::*;
pub use router::*;
pub use table::*;
