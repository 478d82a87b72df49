//! Chain state: data model and persistent store
//!
//! The store exclusively owns mutation of chain membership and the
//! last-chain pointer; executors go through it for every append.

pub mod chain;
pub mod store;

pub use chain::{Chain, SnapshotKind, SnapshotRecord};
pub use store::ChainStore;
