//! Restore command
//!
//! Resolves the replay plan, prints it, and hands it to the restore
//! executor. The target pool must already exist; the target dataset is
//! created (or overwritten) by the replay itself.

use clap::Args;

use crate::audit::{EventKind, EventRecord};
use crate::engine::{SnapshotEngine, ZfsEngine};
use crate::error::{BackupError, BackupResult};
use crate::restore::{AssumeYes, RestoreExecutor, RestorePlan, RestoreSelector, StdinConfirm};

use super::{event_log, record_event, CommonArgs};

/// Arguments for `zfs-chain restore`
#[derive(Args, Debug)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Pool to restore into
    #[arg(short, long)]
    pub pool: String,

    /// Chain to restore; defaults to the most recent
    #[arg(short, long)]
    pub chain: Option<String>,

    /// Stop after this snapshot (name, file name, or timestamp)
    #[arg(short, long)]
    pub snapshot: Option<String>,

    /// Show the plan without restoring anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

pub fn run_restore(args: RestoreArgs) -> BackupResult<()> {
    let store = args.common.open_store()?;
    let log = event_log(&store);
    let dataset = &args.common.dataset;

    let engine = ZfsEngine::new();
    engine.preflight(None)?;
    if !engine.pool_exists(&args.pool)? {
        return Err(BackupError::Config(format!(
            "Pool '{}' does not exist",
            args.pool
        )));
    }

    let selector = RestoreSelector::new(&store);
    let plan = selector.select(
        args.chain.as_deref(),
        args.snapshot.as_deref(),
        &args.pool,
        dataset,
    )?;

    println!("Restore plan");
    println!("============");
    for line in plan.summary_lines() {
        println!("{}", line);
    }
    println!();

    if !args.dry_run {
        println!(
            "Restoring {} snapshot(s) into '{}' ...",
            plan.steps.len(),
            plan.destination
        );
    }

    let result = if args.force {
        execute(&engine, &AssumeYes, &plan, args.dry_run)
    } else {
        execute(&engine, &StdinConfirm, &plan, args.dry_run)
    };

    match result {
        Ok(outcome) => {
            if args.dry_run {
                println!("Dry run; nothing was restored.");
            } else {
                println!(
                    "Restore complete: {} snapshot(s) into {}",
                    outcome.steps_applied, outcome.destination
                );
                record_event(
                    &log,
                    EventRecord::succeeded(EventKind::Restore, dataset)
                        .with_chain(&plan.chain_name)
                        .with_message(format!("restored into {}", outcome.destination)),
                );
            }
            Ok(())
        }
        Err(BackupError::Aborted) => {
            println!("Restore aborted.");
            Err(BackupError::Aborted)
        }
        Err(e) => {
            record_event(
                &log,
                EventRecord::failed(EventKind::Restore, dataset, e.to_string())
                    .with_chain(&plan.chain_name),
            );
            Err(e)
        }
    }
}

fn execute<C: crate::restore::Confirm>(
    engine: &ZfsEngine,
    confirm: &C,
    plan: &RestorePlan,
    dry_run: bool,
) -> BackupResult<crate::restore::RestoreOutcome> {
    RestoreExecutor::new(engine, confirm, dry_run).execute(plan)
}
