//! Backup command
//!
//! Plans the capture, escalates to a full when the differential base has
//! vanished from the dataset, executes it, then runs a retention pass so
//! aged chains are pruned on the same schedule backups happen on.

use chrono::{Local, Utc};
use clap::Args;

use crate::audit::{EventKind, EventRecord};
use crate::backup::{BackupExecutor, BackupPlanner};
use crate::config::options::{DEFAULT_INTERVAL_DAYS, DEFAULT_RETENTION_CHAINS};
use crate::engine::{SnapshotEngine, ZfsEngine};
use crate::error::BackupResult;
use crate::retention::RetentionReconciler;

use super::{event_log, print_cleanup_report, record_event, validate_retention, CommonArgs};

/// Arguments for `zfs-chain backup`
#[derive(Args, Debug)]
pub struct BackupArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Days before a chain is retired and a new full is taken
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_DAYS)]
    pub interval: u32,

    /// Number of chains to keep
    #[arg(short = 'k', long, default_value_t = DEFAULT_RETENTION_CHAINS)]
    pub retention: u32,

    /// Throughput limit passed to pv, e.g. 30m
    #[arg(short = 'R', long)]
    pub rate: Option<String>,

    /// Show what would happen without creating anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

pub fn run_backup(args: BackupArgs) -> BackupResult<()> {
    validate_retention(args.retention)?;

    let store = args.common.open_store()?;
    let log = event_log(&store);
    let dataset = &args.common.dataset;

    let engine = ZfsEngine::new();
    engine.preflight(args.rate.as_deref())?;
    if !engine.dataset_exists(dataset)? {
        return Err(crate::error::BackupError::Config(format!(
            "Dataset '{}' does not exist",
            dataset
        )));
    }

    let now = Local::now().naive_local();
    let planner = BackupPlanner::new(&store, args.interval, &args.common.prefix);
    let mut plan = planner.plan(now)?;

    // A differential is useless if its base snapshot was destroyed out
    // from under us; fall back to opening a new chain.
    if let Some(full) = planner.escalate_missing_base(&engine, dataset, &plan, now)? {
        eprintln!(
            "Base snapshot '{}' no longer exists on {}; starting a new chain.",
            plan.base_snapshot().unwrap_or_default(),
            dataset
        );
        plan = full;
    }

    let executor = BackupExecutor::new(&engine, &store, dataset, args.rate.as_deref());

    if args.dry_run {
        println!("Dry run; no snapshots or files will be created.");
        for line in executor.describe(&plan) {
            println!("  {}", line);
        }
        let reconciler = RetentionReconciler::new(
            &engine,
            &store,
            dataset,
            &args.common.prefix,
            args.retention,
            true,
        );
        let report = reconciler.run()?;
        if !report.is_empty() {
            println!("Retention pass:");
            print_cleanup_report(&report, true);
        }
        return Ok(());
    }

    println!(
        "Creating {} backup of {} in {} ...",
        plan.kind().tag(),
        dataset,
        plan.chain_name()
    );

    let outcome = match executor.execute(&plan, Utc::now()) {
        Ok(outcome) => outcome,
        Err(e) => {
            record_event(
                &log,
                EventRecord::failed(EventKind::Backup, dataset, e.to_string())
                    .with_chain(plan.chain_name())
                    .with_snapshot(plan.snapshot_name()),
            );
            return Err(e);
        }
    };

    println!(
        "Backup complete: {} ({} bytes)",
        outcome.file_path.display(),
        outcome.size_bytes
    );
    record_event(
        &log,
        EventRecord::succeeded(EventKind::Backup, dataset)
            .with_chain(&outcome.chain_name)
            .with_snapshot(&outcome.snapshot_name),
    );

    let reconciler = RetentionReconciler::new(
        &engine,
        &store,
        dataset,
        &args.common.prefix,
        args.retention,
        false,
    );
    let report = reconciler.run()?;
    if !report.is_empty() {
        println!("Retention pass:");
        print_cleanup_report(&report, false);
    }
    if !report.is_clean() {
        eprintln!(
            "warning: {} cleanup step(s) failed; they will be retried on the next run",
            report.failures.len()
        );
    }

    Ok(())
}
