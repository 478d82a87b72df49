//! Backup planning and execution
//!
//! The planner turns chain state plus the interval policy into a
//! `BackupPlan`; the executor applies a plan (or, in dry-run, renders
//! it). Keeping the decision in one value avoids two drifting code
//! paths for dry-run and live runs.

pub mod executor;
pub mod planner;

pub use executor::{BackupExecutor, BackupOutcome};
pub use planner::{BackupPlan, BackupPlanner};
