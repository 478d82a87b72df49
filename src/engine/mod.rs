//! Snapshot engine abstraction
//!
//! The core treats the snapshot tooling as a collaborator with a narrow
//! contract: create and destroy snapshots, serialize one to a compressed
//! file, materialize a serialized stream into a dataset, and list what
//! exists. The production implementation shells out to the ZFS userland
//! tools; tests substitute an in-memory engine.

pub mod zfs;

use std::path::Path;

use crate::error::BackupResult;

/// Narrow contract over the underlying snapshot tooling
pub trait SnapshotEngine {
    /// Whether a dataset exists
    fn dataset_exists(&self, dataset: &str) -> BackupResult<bool>;

    /// Whether a pool exists
    fn pool_exists(&self, pool: &str) -> BackupResult<bool>;

    /// Whether `dataset@snapshot` exists
    fn snapshot_exists(&self, dataset: &str, snapshot: &str) -> BackupResult<bool>;

    /// Create a recursive snapshot `dataset@snapshot`
    fn create_snapshot(&self, dataset: &str, snapshot: &str) -> BackupResult<()>;

    /// Destroy a snapshot `dataset@snapshot`
    fn destroy_snapshot(&self, dataset: &str, snapshot: &str) -> BackupResult<()>;

    /// Snapshot names present on the engine for `dataset`
    fn list_snapshots(&self, dataset: &str) -> BackupResult<Vec<String>>;

    /// Create a dataset (used to ensure the restore destination exists)
    fn create_dataset(&self, dataset: &str) -> BackupResult<()>;

    /// Serialize `dataset@snapshot` (incrementally against `base` when
    /// given) through the optional rate limiter and the compressor into
    /// `out`. Returns the bytes written.
    fn serialize_to_file(
        &self,
        dataset: &str,
        snapshot: &str,
        base: Option<&str>,
        out: &Path,
        rate: Option<&str>,
    ) -> BackupResult<u64>;

    /// Check that `file` decompresses to a plausible serialized stream
    fn verify_stream_file(&self, file: &Path) -> BackupResult<bool>;

    /// Decompress `file` and feed it to the engine's receive operation
    /// for `dataset`. Destructive on the destination.
    fn materialize_from_file(&self, file: &Path, dataset: &str) -> BackupResult<()>;
}

pub use zfs::ZfsEngine;
