//! Lock-free counter storage
//!
//! - [`chain`]: append-only CAS linked lists, one node per distinct event
//! - [`cube`]: one day of `minute × partition` chains with parallel queries

pub mod chain;
pub mod cube;

pub use chain::{CounterChain, CounterNode, Upsert};
pub use cube::Cube;
