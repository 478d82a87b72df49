//! CLI command handlers
//!
//! Thin glue between clap argument structs and the library: each handler
//! validates its inputs, wires up the store and engine, runs the
//! operation, and appends the result to the event log.

pub mod backup;
pub mod cleanup;
pub mod restore;

pub use backup::{run_backup, BackupArgs};
pub use cleanup::{run_cleanup, CleanupArgs};
pub use restore::{run_restore, RestoreArgs};

use std::path::PathBuf;

use clap::Args;

use crate::audit::{EventLog, EventRecord};
use crate::config::options::DEFAULT_PREFIX;
use crate::config::BackupPaths;
use crate::error::BackupResult;
use crate::state::ChainStore;

/// Arguments shared by every subcommand
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Source ZFS dataset, e.g. tank/data
    #[arg(short, long, env = "ZFS_CHAIN_DATASET")]
    pub dataset: String,

    /// Mount point of the backup destination
    #[arg(short, long, env = "ZFS_CHAIN_MOUNT")]
    pub mount: PathBuf,

    /// Snapshot name prefix
    #[arg(short = 'x', long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,
}

impl CommonArgs {
    /// Validate the arguments and open the chain store for this dataset
    pub fn open_store(&self) -> BackupResult<ChainStore> {
        let paths = BackupPaths::new(&self.mount, &self.dataset)?;
        Ok(ChainStore::new(paths))
    }
}

/// The event log for a store's destination
fn event_log(store: &ChainStore) -> EventLog {
    EventLog::new(store.paths().event_log())
}

/// Append an event, tolerating a broken log file
///
/// The operation already finished; a failing history write is reported
/// but never turns a successful run into a failure.
fn record_event(log: &EventLog, record: EventRecord) {
    if let Err(e) = log.record(&record) {
        eprintln!("warning: failed to write event log: {}", e);
    }
}

/// A retention value of zero keeps nothing and is always a mistake
fn validate_retention(retention_chains: u32) -> BackupResult<()> {
    if retention_chains == 0 {
        return Err(crate::error::BackupError::Config(
            "Retention must keep at least one chain".into(),
        ));
    }
    Ok(())
}

/// Render a cleanup report the way the handlers print it
fn print_cleanup_report(report: &crate::retention::CleanupReport, dry_run: bool) {
    let verb = if dry_run { "would delete" } else { "deleted" };
    for chain in &report.deleted_chains {
        println!("  {} chain {}", verb, chain);
    }
    let verb = if dry_run { "would destroy" } else { "destroyed" };
    for snapshot in &report.removed_snapshots {
        println!("  {} orphan snapshot {}", verb, snapshot);
    }
    let verb = if dry_run { "would sweep" } else { "swept" };
    for file in &report.swept_temp_files {
        println!("  {} stale temp file {}", verb, file.display());
    }
    for failure in &report.failures {
        eprintln!("  cleanup failure: {}", failure);
    }
}
