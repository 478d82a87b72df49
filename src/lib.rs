//! zfs-chain: chain-based ZFS backup and restore
//!
//! Captures a dataset as chains of serialized snapshot streams: each
//! chain starts with one full snapshot and grows differentials against
//! that anchor until the chain ages out, at which point a new chain is
//! opened. Chains are self-contained directories of compressed stream
//! files plus a manifest, so a restore needs nothing but the chain
//! directory and replays the full followed by its differentials in
//! order.
//!
//! The tool assumes a single writer per destination; run it from a
//! scheduler that serializes invocations (systemd timers and cron both
//! do) rather than concurrently.

pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod restore;
pub mod retention;
pub mod state;

pub use error::{BackupError, BackupResult};
