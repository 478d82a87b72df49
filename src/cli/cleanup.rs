//! Cleanup command
//!
//! Runs the retention and orphan reconciliation pass on its own, outside
//! any backup. Partial failures are reported and surfaced as a non-zero
//! exit so schedulers notice, but every deletion that can proceed does.

use clap::Args;

use crate::audit::{EventKind, EventRecord};
use crate::config::options::DEFAULT_RETENTION_CHAINS;
use crate::engine::ZfsEngine;
use crate::error::{BackupError, BackupResult};
use crate::retention::RetentionReconciler;

use super::{event_log, print_cleanup_report, record_event, validate_retention, CommonArgs};

/// Arguments for `zfs-chain cleanup`
#[derive(Args, Debug)]
pub struct CleanupArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Number of chains to keep
    #[arg(short = 'k', long, default_value_t = DEFAULT_RETENTION_CHAINS)]
    pub retention: u32,

    /// Show what would be deleted without deleting it
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

pub fn run_cleanup(args: CleanupArgs) -> BackupResult<()> {
    validate_retention(args.retention)?;

    let store = args.common.open_store()?;
    let log = event_log(&store);
    let dataset = &args.common.dataset;

    let engine = ZfsEngine::new();
    engine.preflight(None)?;

    let reconciler = RetentionReconciler::new(
        &engine,
        &store,
        dataset,
        &args.common.prefix,
        args.retention,
        args.dry_run,
    );
    let report = reconciler.run()?;

    if report.is_empty() {
        println!("Nothing to clean up.");
        return Ok(());
    }

    print_cleanup_report(&report, args.dry_run);

    if args.dry_run {
        return Ok(());
    }

    if report.is_clean() {
        record_event(
            &log,
            EventRecord::succeeded(EventKind::Cleanup, dataset).with_message(format!(
                "{} chain(s) pruned, {} snapshot(s) destroyed, {} temp file(s) swept",
                report.deleted_chains.len(),
                report.removed_snapshots.len(),
                report.swept_temp_files.len()
            )),
        );
        Ok(())
    } else {
        record_event(
            &log,
            EventRecord::failed(
                EventKind::Cleanup,
                dataset,
                format!("{} deletion(s) failed", report.failures.len()),
            ),
        );
        Err(BackupError::PartialCleanup(format!(
            "{} deletion(s) failed",
            report.failures.len()
        )))
    }
}
