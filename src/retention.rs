//! Retention and orphan reconciliation
//!
//! Prunes chains beyond the retention window and reconciles the live
//! engine snapshot list against the surviving chain records. Deletion is
//! two-phase per chain: backing files first, then the chain directory
//! (which carries the manifest, i.e. the store entry). A failed file
//! removal is recorded and the run continues; the chain entry stays so
//! the next invocation retries. The chain named by the last-chain
//! pointer is never pruned.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::engine::SnapshotEngine;
use crate::error::BackupResult;
use crate::state::store::is_manifestless_dir;
use crate::state::{Chain, ChainStore};

/// Temp files older than this are residue of an interrupted run
const TEMP_FILE_MAX_AGE: Duration = Duration::from_secs(3600);

/// What one reconciliation pass did (or, in dry-run, would do)
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Chains whose files and store entries were removed
    pub deleted_chains: Vec<String>,
    /// Engine snapshots destroyed because no surviving chain references them
    pub removed_snapshots: Vec<String>,
    /// Stale temporary files swept from the backup directory
    pub swept_temp_files: Vec<PathBuf>,
    /// Individual deletions that failed; retried on the next invocation
    pub failures: Vec<String>,
}

impl CleanupReport {
    /// Whether every attempted deletion succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether the pass had nothing to do
    pub fn is_empty(&self) -> bool {
        self.deleted_chains.is_empty()
            && self.removed_snapshots.is_empty()
            && self.swept_temp_files.is_empty()
            && self.failures.is_empty()
    }
}

/// Prunes aged chains and orphaned engine snapshots
pub struct RetentionReconciler<'a, E: SnapshotEngine> {
    engine: &'a E,
    store: &'a ChainStore,
    dataset: &'a str,
    prefix: &'a str,
    retention_chains: u32,
    dry_run: bool,
}

impl<'a, E: SnapshotEngine> RetentionReconciler<'a, E> {
    pub fn new(
        engine: &'a E,
        store: &'a ChainStore,
        dataset: &'a str,
        prefix: &'a str,
        retention_chains: u32,
        dry_run: bool,
    ) -> Self {
        Self {
            engine,
            store,
            dataset,
            prefix,
            retention_chains,
            dry_run,
        }
    }

    /// Run one reconciliation pass
    pub fn run(&self) -> BackupResult<CleanupReport> {
        let mut report = CleanupReport::default();

        let chains = self.store.chains()?;
        let pointer = self.store.last_chain_pointer()?;

        let survivors = self.prune_chains(&chains, pointer.as_deref(), &mut report)?;
        self.reconcile_engine_snapshots(&survivors, &mut report)?;
        self.sweep_temp_files(&mut report);

        Ok(report)
    }

    /// Delete chains beyond the N most recent by creation date
    ///
    /// Returns the surviving chains. The pointer's chain survives even
    /// outside the window; it is the active chain until superseded.
    fn prune_chains(
        &self,
        chains: &[Chain],
        pointer: Option<&str>,
        report: &mut CleanupReport,
    ) -> BackupResult<Vec<Chain>> {
        let keep_from = chains
            .len()
            .saturating_sub(self.retention_chains as usize);

        let mut survivors = Vec::new();
        for (idx, chain) in chains.iter().enumerate() {
            let in_window = idx >= keep_from;
            let is_active = pointer == Some(chain.name.as_str());
            if in_window || is_active {
                survivors.push(chain.clone());
                continue;
            }

            if self.delete_chain(chain, report) {
                report.deleted_chains.push(chain.name.clone());
            } else {
                // Entry stays; the next run retries the remaining files.
                survivors.push(chain.clone());
            }
        }
        Ok(survivors)
    }

    /// Two-phase chain deletion; returns true when the entry is gone
    fn delete_chain(&self, chain: &Chain, report: &mut CleanupReport) -> bool {
        if self.dry_run {
            return true;
        }

        let paths = self.store.paths();
        let mut all_files_removed = true;
        for record in chain.records() {
            let file = paths.snapshot_file(&chain.name, &record.file_name);
            if !file.exists() {
                continue;
            }
            if let Err(e) = fs::remove_file(&file) {
                report
                    .failures
                    .push(format!("failed to remove {}: {}", file.display(), e));
                all_files_removed = false;
            }
        }
        if !all_files_removed {
            return false;
        }

        if let Err(e) = self.store.remove_chain(&chain.name) {
            report
                .failures
                .push(format!("failed to remove chain {}: {}", chain.name, e));
            return false;
        }
        true
    }

    /// Destroy prefix-qualified engine snapshots no surviving chain references
    ///
    /// Guards against snapshots left behind by an interrupted backup or
    /// restore. Snapshots outside our prefix belong to someone else and
    /// are never touched.
    fn reconcile_engine_snapshots(
        &self,
        survivors: &[Chain],
        report: &mut CleanupReport,
    ) -> BackupResult<()> {
        let live = self.engine.list_snapshots(self.dataset)?;
        let referenced: Vec<&str> = survivors
            .iter()
            .flat_map(|c| c.records())
            .map(|r| r.name.as_str())
            .collect();

        let full_tag = format!("{}-full-", self.prefix);
        let diff_tag = format!("{}-diff-", self.prefix);
        for snapshot in live {
            let ours = snapshot.starts_with(&full_tag) || snapshot.starts_with(&diff_tag);
            if !ours || referenced.contains(&snapshot.as_str()) {
                continue;
            }
            if !self.dry_run {
                if let Err(e) = self.engine.destroy_snapshot(self.dataset, &snapshot) {
                    report
                        .failures
                        .push(format!("failed to destroy snapshot {}: {}", snapshot, e));
                    continue;
                }
            }
            report.removed_snapshots.push(snapshot);
        }
        Ok(())
    }

    /// Remove stale `*.tmp` files at the root and inside chain directories,
    /// plus chain directories that ended up empty with no manifest
    fn sweep_temp_files(&self, report: &mut CleanupReport) {
        let paths = self.store.paths();
        let root = paths.target_dir().to_path_buf();
        if !root.is_dir() {
            return;
        }

        let mut dirs = vec![root.clone()];
        if let Ok(entries) = fs::read_dir(&root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir()
                    && path
                        .file_name()
                        .map_or(false, |n| n.to_string_lossy().starts_with("chain-"))
                {
                    dirs.push(path);
                }
            }
        }

        let now = SystemTime::now();
        for dir in &dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let is_tmp = path.extension().map_or(false, |ext| ext == "tmp");
                if !is_tmp || !paths.contains(&path) {
                    continue;
                }
                let stale = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .map_or(false, |modified| is_stale(modified, now));
                if !stale {
                    continue;
                }
                if self.dry_run {
                    report.swept_temp_files.push(path);
                } else {
                    match fs::remove_file(&path) {
                        Ok(()) => report.swept_temp_files.push(path),
                        Err(e) => report
                            .failures
                            .push(format!("failed to remove temp file {}: {}", path.display(), e)),
                    }
                }
            }
        }

        // A chain directory left empty and manifestless is residue of a
        // backup that never completed its anchor.
        if !self.dry_run {
            for dir in dirs.iter().skip(1) {
                let empty = fs::read_dir(dir).map_or(false, |mut e| e.next().is_none());
                if empty && is_manifestless_dir(dir) && paths.contains(dir) {
                    let _ = fs::remove_dir(dir);
                }
            }
        }
    }
}

/// Whether a temp file last modified at `modified` is old enough to sweep
fn is_stale(modified: SystemTime, now: SystemTime) -> bool {
    now.duration_since(modified)
        .map_or(false, |age| age > TEMP_FILE_MAX_AGE)
}
