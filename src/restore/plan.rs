//! Restore selection
//!
//! Resolves which chain to restore, optionally truncates it at a target
//! snapshot, and fixes the replay order by construction: the full anchor
//! first, then differentials in insertion order. Directory listing order
//! never enters into it; the plan is built from the chain record.

use std::path::PathBuf;

use crate::error::{BackupError, BackupResult};
use crate::state::{Chain, ChainStore, SnapshotRecord};

/// One replay step: a record and its backing file
#[derive(Debug, Clone)]
pub struct RestoreStep {
    pub record: SnapshotRecord,
    pub file_path: PathBuf,
}

/// A deterministic replay plan for one chain
#[derive(Debug, Clone)]
pub struct RestorePlan {
    /// The chain being replayed
    pub chain_name: String,
    /// Target dataset, `<pool>/<dataset leaf>`
    pub destination: String,
    /// Steps in replay order: anchor, then differentials chronologically
    pub steps: Vec<RestoreStep>,
}

impl RestorePlan {
    /// Human-readable plan rendering for the summary and dry-run output
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Source chain:        {}", self.chain_name),
            format!("Target dataset:      {}", self.destination),
            format!("Number of snapshots: {}", self.steps.len()),
            "Files to be restored, in order:".to_string(),
        ];
        for step in &self.steps {
            lines.push(format!("  - {}", step.record.file_name));
        }
        lines
    }
}

/// Resolves a chain and an optional truncation point into a plan
pub struct RestoreSelector<'a> {
    store: &'a ChainStore,
}

impl<'a> RestoreSelector<'a> {
    pub fn new(store: &'a ChainStore) -> Self {
        Self { store }
    }

    /// Build the replay plan
    ///
    /// `chain`: explicit chain name, or the most recent chain when absent.
    /// `target`: restore up to and including the first record matching
    /// this filename, snapshot name, or timestamp; an unmatched target is
    /// a `Selection` error rather than a silent full-chain restore.
    pub fn select(
        &self,
        chain: Option<&str>,
        target: Option<&str>,
        pool: &str,
        dataset: &str,
    ) -> BackupResult<RestorePlan> {
        let chain = self.resolve_chain(chain)?;

        if !chain.is_restorable() {
            return Err(BackupError::Selection(format!(
                "chain {} has no completed snapshots",
                chain.name
            )));
        }

        let mut steps: Vec<RestoreStep> = Vec::new();
        let mut matched = target.is_none();
        for record in chain.completed_records() {
            steps.push(RestoreStep {
                record: record.clone(),
                file_path: self
                    .store
                    .paths()
                    .snapshot_file(&chain.name, &record.file_name),
            });
            if let Some(target) = target {
                if record_matches(record, target) {
                    matched = true;
                    break;
                }
            }
        }
        if !matched {
            return Err(BackupError::snapshot_not_found(target.unwrap_or_default()));
        }

        let leaf = dataset.rsplit('/').next().unwrap_or(dataset);
        Ok(RestorePlan {
            chain_name: chain.name,
            destination: format!("{}/{}", pool, leaf),
            steps,
        })
    }

    fn resolve_chain(&self, chain: Option<&str>) -> BackupResult<Chain> {
        match chain {
            Some(name) => self
                .store
                .load_chain(name)?
                .ok_or_else(|| BackupError::chain_not_found(name)),
            None => self
                .store
                .latest_chain()?
                .ok_or_else(|| BackupError::Selection("no chains found".into())),
        }
    }
}

/// Whether `record` is the truncation point for `target`
///
/// Accepts the exact snapshot name, the exact backing file name, a file
/// name suffix, or a timestamp fragment of the snapshot name.
fn record_matches(record: &SnapshotRecord, target: &str) -> bool {
    record.name == target
        || record.file_name == target
        || record.file_name.ends_with(target)
        || record.name.contains(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupPaths;
    use crate::state::chain::{chain_name_for, snapshot_name, stream_file_name};
    use crate::state::SnapshotKind;
    use chrono::{NaiveDate, Utc};
    use tempfile::TempDir;

    fn setup() -> (ChainStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let paths = BackupPaths::with_target_dir(temp.path().to_path_buf());
        (ChainStore::new(paths), temp)
    }

    fn seed_chain(store: &ChainStore, day: u32, diff_days: &[u32]) -> Chain {
        let date = NaiveDate::from_ymd_opt(2025, 1, day).unwrap();
        let full = snapshot_name("p", SnapshotKind::Full, date.and_hms_opt(1, 0, 0).unwrap());
        let mut chain = Chain {
            name: chain_name_for(date),
            created_on: date,
            anchor: SnapshotRecord {
                file_name: stream_file_name(&full),
                name: full.clone(),
                kind: SnapshotKind::Full,
                parent: None,
                size_bytes: 100,
                complete: true,
                created_at: Utc::now(),
            },
            diffs: Vec::new(),
        };
        store.create_chain(&chain).unwrap();
        for d in diff_days {
            let at = NaiveDate::from_ymd_opt(2025, 1, *d)
                .unwrap()
                .and_hms_opt(2, 0, 0)
                .unwrap();
            let name = snapshot_name("p", SnapshotKind::Differential, at);
            chain = store
                .append_differential(
                    &chain.name,
                    SnapshotRecord {
                        file_name: stream_file_name(&name),
                        name,
                        kind: SnapshotKind::Differential,
                        parent: Some(full.clone()),
                        size_bytes: 10,
                        complete: true,
                        created_at: Utc::now(),
                    },
                )
                .unwrap();
        }
        chain
    }

    #[test]
    fn test_selects_latest_chain_by_default() {
        let (store, _temp) = setup();
        seed_chain(&store, 1, &[]);
        seed_chain(&store, 8, &[9]);

        let plan = RestoreSelector::new(&store)
            .select(None, None, "restored", "tank/data")
            .unwrap();

        assert_eq!(plan.chain_name, "chain-20250108");
        assert_eq!(plan.destination, "restored/data");
        assert_eq!(plan.steps.len(), 2);
    }

    #[test]
    fn test_selects_named_chain() {
        let (store, _temp) = setup();
        seed_chain(&store, 1, &[2]);
        seed_chain(&store, 8, &[]);

        let plan = RestoreSelector::new(&store)
            .select(Some("chain-20250101"), None, "restored", "tank/data")
            .unwrap();
        assert_eq!(plan.chain_name, "chain-20250101");
        assert_eq!(plan.steps.len(), 2);
    }

    #[test]
    fn test_missing_chain_is_selection_error() {
        let (store, _temp) = setup();
        seed_chain(&store, 1, &[]);

        let err = RestoreSelector::new(&store)
            .select(Some("chain-20240101"), None, "restored", "tank/data")
            .unwrap_err();
        assert!(err.is_selection());
    }

    #[test]
    fn test_no_chains_is_selection_error() {
        let (store, _temp) = setup();
        let err = RestoreSelector::new(&store)
            .select(None, None, "restored", "tank/data")
            .unwrap_err();
        assert!(err.is_selection());
    }

    #[test]
    fn test_replay_order_is_anchor_then_chronological() {
        let (store, _temp) = setup();
        seed_chain(&store, 1, &[2, 3, 4]);

        let plan = RestoreSelector::new(&store)
            .select(None, None, "restored", "tank/data")
            .unwrap();

        let kinds: Vec<_> = plan.steps.iter().map(|s| s.record.kind).collect();
        assert_eq!(kinds[0], SnapshotKind::Full);
        assert!(kinds[1..].iter().all(|k| *k == SnapshotKind::Differential));
        let names: Vec<_> = plan.steps.iter().map(|s| s.record.name.clone()).collect();
        let mut sorted = names[1..].to_vec();
        sorted.sort();
        assert_eq!(&names[1..], sorted.as_slice());
    }

    #[test]
    fn test_truncates_at_target_snapshot() {
        let (store, _temp) = setup();
        seed_chain(&store, 1, &[2, 3, 4]);

        // Second differential by timestamp fragment; diff3 is excluded.
        let plan = RestoreSelector::new(&store)
            .select(None, Some("20250103"), "restored", "tank/data")
            .unwrap();

        assert_eq!(plan.steps.len(), 3);
        assert!(plan.steps[2].record.name.contains("20250103"));
    }

    #[test]
    fn test_truncation_by_file_name() {
        let (store, _temp) = setup();
        let chain = seed_chain(&store, 1, &[2, 3]);

        let target = chain.diffs[0].file_name.clone();
        let plan = RestoreSelector::new(&store)
            .select(None, Some(&target), "restored", "tank/data")
            .unwrap();
        assert_eq!(plan.steps.len(), 2);
    }

    #[test]
    fn test_unmatched_target_is_selection_error() {
        let (store, _temp) = setup();
        seed_chain(&store, 1, &[2]);

        let err = RestoreSelector::new(&store)
            .select(None, Some("20990101"), "restored", "tank/data")
            .unwrap_err();
        assert!(err.is_selection());
    }

    #[test]
    fn test_skips_incomplete_records() {
        let (store, temp) = setup();
        let chain = seed_chain(&store, 1, &[2]);

        // Tamper a copy of the manifest so the differential is pending.
        let manifest = temp.path().join(&chain.name).join("manifest.json");
        let mut loaded: Chain =
            serde_json::from_str(&std::fs::read_to_string(&manifest).unwrap()).unwrap();
        loaded.diffs[0].complete = false;
        std::fs::write(&manifest, serde_json::to_string_pretty(&loaded).unwrap()).unwrap();

        let plan = RestoreSelector::new(&store)
            .select(None, None, "restored", "tank/data")
            .unwrap();
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn test_summary_lists_files_in_order() {
        let (store, _temp) = setup();
        seed_chain(&store, 1, &[2]);

        let plan = RestoreSelector::new(&store)
            .select(None, None, "restored", "tank/data")
            .unwrap();
        let summary = plan.summary_lines().join("\n");
        assert!(summary.contains("restored/data"));
        let full_pos = summary.find("p-full-").unwrap();
        let diff_pos = summary.find("p-diff-").unwrap();
        assert!(full_pos < diff_pos);
    }
}
