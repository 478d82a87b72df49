//! Restore execution
//!
//! Replays a plan against the snapshot engine. Every backing file is
//! verified before the first destructive call so a damaged chain is
//! detected while the target dataset is still untouched.

use std::fs;

use crate::engine::SnapshotEngine;
use crate::error::{BackupError, BackupResult};
use crate::restore::confirm::Confirm;
use crate::restore::plan::RestorePlan;

/// What a completed restore did
#[derive(Debug)]
pub struct RestoreOutcome {
    pub destination: String,
    pub steps_applied: usize,
}

pub struct RestoreExecutor<'a, E: SnapshotEngine, C: Confirm> {
    engine: &'a E,
    confirm: &'a C,
    dry_run: bool,
}

impl<'a, E: SnapshotEngine, C: Confirm> RestoreExecutor<'a, E, C> {
    pub fn new(engine: &'a E, confirm: &'a C, dry_run: bool) -> Self {
        Self {
            engine,
            confirm,
            dry_run,
        }
    }

    /// Verify, confirm, and replay the plan in order
    ///
    /// Dry-run mode stops after verification, before the confirmation
    /// gate, having touched nothing. A declined confirmation is an
    /// `Aborted` error. The first failed replay step aborts the run;
    /// earlier steps are already applied and are not rolled back.
    pub fn execute(&self, plan: &RestorePlan) -> BackupResult<RestoreOutcome> {
        self.verify_files(plan)?;

        if self.dry_run {
            return Ok(RestoreOutcome {
                destination: plan.destination.clone(),
                steps_applied: 0,
            });
        }

        let prompt = format!(
            "This will restore {} snapshot(s) from {} into dataset '{}', \
             overwriting it if it exists.",
            plan.steps.len(),
            plan.chain_name,
            plan.destination
        );
        if !self.confirm.confirm(&prompt) {
            return Err(BackupError::Aborted);
        }

        if !self.engine.dataset_exists(&plan.destination)? {
            self.engine.create_dataset(&plan.destination)?;
        }

        for step in &plan.steps {
            self.engine
                .materialize_from_file(&step.file_path, &plan.destination)?;
        }

        Ok(RestoreOutcome {
            destination: plan.destination.clone(),
            steps_applied: plan.steps.len(),
        })
    }

    fn verify_files(&self, plan: &RestorePlan) -> BackupResult<()> {
        for step in &plan.steps {
            let meta = fs::metadata(&step.file_path).map_err(|e| {
                BackupError::Selection(format!(
                    "backing file missing for {}: {}",
                    step.record.name, e
                ))
            })?;
            if meta.len() == 0 {
                return Err(BackupError::engine(
                    "verify",
                    "empty file",
                    format!("backing file is empty: {}", step.file_path.display()),
                ));
            }
            if !self.engine.verify_stream_file(&step.file_path)? {
                return Err(BackupError::engine(
                    "verify",
                    "invalid stream",
                    format!(
                        "backing file is not a valid stream: {}",
                        step.file_path.display()
                    ),
                ));
            }
        }
        Ok(())
    }
}
