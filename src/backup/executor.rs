//! Backup executor
//!
//! Drives one capture-and-serialize operation for a plan produced by the
//! planner. The stream lands in a `.tmp` file next to its final path and
//! is renamed only after verification, so no partially-written file is
//! ever visible under the final name. Chain state is mutated only after
//! the rename; any failure leaves the store exactly as it was.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::engine::SnapshotEngine;
use crate::error::{BackupError, BackupResult};
use crate::state::chain::{stream_file_name, Chain, SnapshotRecord};
use crate::state::ChainStore;

use super::planner::BackupPlan;

/// What a completed backup produced
#[derive(Debug)]
pub struct BackupOutcome {
    pub chain_name: String,
    pub snapshot_name: String,
    pub file_path: PathBuf,
    pub size_bytes: u64,
}

/// Executes one backup plan against the engine and the store
pub struct BackupExecutor<'a, E: SnapshotEngine> {
    engine: &'a E,
    store: &'a ChainStore,
    dataset: &'a str,
    rate: Option<&'a str>,
}

impl<'a, E: SnapshotEngine> BackupExecutor<'a, E> {
    pub fn new(
        engine: &'a E,
        store: &'a ChainStore,
        dataset: &'a str,
        rate: Option<&'a str>,
    ) -> Self {
        Self {
            engine,
            store,
            dataset,
            rate,
        }
    }

    /// Render the plan without touching the engine or the filesystem
    ///
    /// This is the dry-run path; it shares the plan value with `execute`
    /// so the printed action always matches what a live run would do.
    pub fn describe(&self, plan: &BackupPlan) -> Vec<String> {
        let final_path = self
            .store
            .paths()
            .snapshot_file(plan.chain_name(), &stream_file_name(plan.snapshot_name()));

        let mut lines = vec![format!(
            "would create {} snapshot {}@{}",
            plan.kind().tag(),
            self.dataset,
            plan.snapshot_name()
        )];
        match plan.base_snapshot() {
            Some(base) => lines.push(format!(
                "would serialize incrementally against {} into {}",
                base,
                final_path.display()
            )),
            None => lines.push(format!("would serialize into {}", final_path.display())),
        }
        if let Some(rate) = self.rate {
            lines.push(format!("would throttle the stream to {}", rate));
        }
        match plan {
            BackupPlan::OpenNewChain { chain_name, .. } => lines.push(format!(
                "would open chain {} and advance the last-chain pointer",
                chain_name
            )),
            BackupPlan::ContinueChain { chain_name, .. } => {
                lines.push(format!("would append to chain {}", chain_name))
            }
        }
        lines
    }

    /// Execute the plan: snapshot, serialize, verify, finalize, record
    pub fn execute(&self, plan: &BackupPlan, now: DateTime<Utc>) -> BackupResult<BackupOutcome> {
        let paths = self.store.paths();
        paths.ensure_target_dir()?;
        let chain_dir = paths.chain_dir(plan.chain_name());
        fs::create_dir_all(&chain_dir)
            .map_err(|e| BackupError::Io(format!("Failed to create chain directory: {}", e)))?;

        let file_name = stream_file_name(plan.snapshot_name());
        let final_path = chain_dir.join(&file_name);
        let temp_path = chain_dir.join(format!("{}.tmp", file_name));

        self.engine
            .create_snapshot(self.dataset, plan.snapshot_name())?;

        let size = match self.capture(plan, &temp_path, &final_path) {
            Ok(size) => size,
            Err(e) => {
                // Discard the partial file and the snapshot we just took;
                // the chain must look exactly as it did before the attempt.
                if temp_path.exists() {
                    let _ = fs::remove_file(&temp_path);
                }
                let _ = self
                    .engine
                    .destroy_snapshot(self.dataset, plan.snapshot_name());
                return Err(e);
            }
        };

        let record = SnapshotRecord {
            name: plan.snapshot_name().to_string(),
            kind: plan.kind(),
            parent: plan.base_snapshot().map(str::to_string),
            file_name,
            size_bytes: size,
            complete: true,
            created_at: now,
        };

        match plan {
            BackupPlan::OpenNewChain { chain_name, .. } => {
                self.store.create_chain(&Chain {
                    name: chain_name.clone(),
                    created_on: now.date_naive(),
                    anchor: record,
                    diffs: Vec::new(),
                })?;
            }
            BackupPlan::ContinueChain { chain_name, .. } => {
                self.store.append_differential(chain_name, record)?;
            }
        }

        Ok(BackupOutcome {
            chain_name: plan.chain_name().to_string(),
            snapshot_name: plan.snapshot_name().to_string(),
            file_path: final_path,
            size_bytes: size,
        })
    }

    /// Serialize into the temp file, verify it, and atomically finalize
    fn capture(
        &self,
        plan: &BackupPlan,
        temp_path: &std::path::Path,
        final_path: &std::path::Path,
    ) -> BackupResult<u64> {
        let size = self.engine.serialize_to_file(
            self.dataset,
            plan.snapshot_name(),
            plan.base_snapshot(),
            temp_path,
            self.rate,
        )?;

        if size == 0 {
            return Err(BackupError::engine(
                "serialize",
                "empty output",
                format!("{} is empty (pipeline failure)", temp_path.display()),
            ));
        }
        if !self.engine.verify_stream_file(temp_path)? {
            return Err(BackupError::engine(
                "verify",
                "invalid stream",
                format!("{} is not a valid serialized stream", temp_path.display()),
            ));
        }

        fs::rename(temp_path, final_path).map_err(|e| {
            BackupError::Io(format!("Failed to finalize {}: {}", final_path.display(), e))
        })?;
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::planner::BackupPlanner;
    use crate::config::BackupPaths;
    use crate::state::SnapshotKind;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::path::Path;
    use tempfile::TempDir;

    /// Engine double: writes deterministic bytes, records calls, and can
    /// be told to fail mid-serialize.
    #[derive(Default)]
    struct FakeEngine {
        calls: RefCell<Vec<String>>,
        fail_serialize: bool,
        fail_verify: bool,
    }

    impl SnapshotEngine for FakeEngine {
        fn dataset_exists(&self, _dataset: &str) -> BackupResult<bool> {
            Ok(true)
        }
        fn pool_exists(&self, _pool: &str) -> BackupResult<bool> {
            Ok(true)
        }
        fn snapshot_exists(&self, _dataset: &str, _snapshot: &str) -> BackupResult<bool> {
            Ok(true)
        }
        fn create_snapshot(&self, dataset: &str, snapshot: &str) -> BackupResult<()> {
            self.calls
                .borrow_mut()
                .push(format!("snapshot {}@{}", dataset, snapshot));
            Ok(())
        }
        fn destroy_snapshot(&self, dataset: &str, snapshot: &str) -> BackupResult<()> {
            self.calls
                .borrow_mut()
                .push(format!("destroy {}@{}", dataset, snapshot));
            Ok(())
        }
        fn list_snapshots(&self, _dataset: &str) -> BackupResult<Vec<String>> {
            Ok(Vec::new())
        }
        fn create_dataset(&self, _dataset: &str) -> BackupResult<()> {
            Ok(())
        }
        fn serialize_to_file(
            &self,
            _dataset: &str,
            snapshot: &str,
            base: Option<&str>,
            out: &Path,
            _rate: Option<&str>,
        ) -> BackupResult<u64> {
            self.calls
                .borrow_mut()
                .push(format!("serialize {} base={:?}", snapshot, base));
            if self.fail_serialize {
                // Simulate an interrupted pipeline: partial temp output,
                // then a failed child.
                fs::write(out, b"partial").unwrap();
                return Err(BackupError::engine("zfs send", "exit status: 1", "stream truncated"));
            }
            fs::write(out, b"stream-bytes").unwrap();
            Ok(12)
        }
        fn verify_stream_file(&self, _file: &Path) -> BackupResult<bool> {
            Ok(!self.fail_verify)
        }
        fn materialize_from_file(&self, _file: &Path, _dataset: &str) -> BackupResult<()> {
            Ok(())
        }
    }

    fn setup() -> (ChainStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let paths = BackupPaths::with_target_dir(temp.path().to_path_buf());
        (ChainStore::new(paths), temp)
    }

    fn at(d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, d)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap()
    }

    fn utc(d: u32) -> DateTime<Utc> {
        at(d).and_utc()
    }

    #[test]
    fn test_full_backup_creates_chain_and_pointer() {
        let (store, _temp) = setup();
        let engine = FakeEngine::default();
        let plan = BackupPlanner::new(&store, 7, "p").plan(at(1)).unwrap();
        let executor = BackupExecutor::new(&engine, &store, "tank/data", None);

        let outcome = executor.execute(&plan, utc(1)).unwrap();

        assert_eq!(outcome.chain_name, "chain-20250101");
        assert!(outcome.file_path.exists());
        assert_eq!(outcome.size_bytes, 12);
        assert_eq!(
            store.last_chain_pointer().unwrap().as_deref(),
            Some("chain-20250101")
        );
        let chain = store.load_chain("chain-20250101").unwrap().unwrap();
        assert!(chain.anchor.complete);
        assert_eq!(chain.anchor.kind, SnapshotKind::Full);
    }

    #[test]
    fn test_differential_appends_to_chain() {
        let (store, _temp) = setup();
        let engine = FakeEngine::default();
        let planner = BackupPlanner::new(&store, 7, "p");
        let executor = BackupExecutor::new(&engine, &store, "tank/data", None);

        let full = planner.plan(at(1)).unwrap();
        executor.execute(&full, utc(1)).unwrap();
        let diff = planner.plan(at(2)).unwrap();
        let outcome = executor.execute(&diff, utc(2)).unwrap();

        assert_eq!(outcome.chain_name, "chain-20250101");
        let chain = store.load_chain("chain-20250101").unwrap().unwrap();
        assert_eq!(chain.diffs.len(), 1);
        assert_eq!(
            chain.diffs[0].parent.as_deref(),
            Some(chain.anchor.name.as_str())
        );
    }

    #[test]
    fn test_failed_serialize_leaves_state_untouched() {
        let (store, temp) = setup();
        let planner = BackupPlanner::new(&store, 7, "p");

        // Establish a chain, snapshot the manifest bytes, then fail a
        // differential mid-stream.
        let ok_engine = FakeEngine::default();
        let full = planner.plan(at(1)).unwrap();
        BackupExecutor::new(&ok_engine, &store, "tank/data", None)
            .execute(&full, utc(1))
            .unwrap();
        let manifest = temp.path().join("chain-20250101").join("manifest.json");
        let before = fs::read(&manifest).unwrap();

        let engine = FakeEngine {
            fail_serialize: true,
            ..Default::default()
        };
        let diff = planner.plan(at(2)).unwrap();
        let err = BackupExecutor::new(&engine, &store, "tank/data", None)
            .execute(&diff, utc(2))
            .unwrap_err();
        assert!(matches!(err, BackupError::Engine { .. }));

        // Store byte-for-byte unchanged, no final file, temp file discarded.
        assert_eq!(fs::read(&manifest).unwrap(), before);
        let chain_dir = temp.path().join("chain-20250101");
        let leftovers: Vec<_> = fs::read_dir(&chain_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.contains("diff"))
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);

        // The snapshot taken for the failed attempt was destroyed.
        let calls = engine.calls.borrow();
        assert!(calls.iter().any(|c| c.starts_with("destroy ")));
    }

    #[test]
    fn test_failed_verification_discards_backup() {
        let (store, temp) = setup();
        let engine = FakeEngine {
            fail_verify: true,
            ..Default::default()
        };
        let plan = BackupPlanner::new(&store, 7, "p").plan(at(1)).unwrap();

        let err = BackupExecutor::new(&engine, &store, "tank/data", None)
            .execute(&plan, utc(1))
            .unwrap_err();
        assert!(matches!(err, BackupError::Engine { .. }));
        assert!(store.last_chain_pointer().unwrap().is_none());
        assert!(store.load_chain("chain-20250101").unwrap().is_none());
        // The chain dir may exist but holds no stream files.
        let dir = temp.path().join("chain-20250101");
        if dir.exists() {
            assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
        }
    }

    #[test]
    fn test_describe_matches_plan_without_side_effects() {
        let (store, temp) = setup();
        let engine = FakeEngine::default();
        let plan = BackupPlanner::new(&store, 7, "p").plan(at(1)).unwrap();
        let executor = BackupExecutor::new(&engine, &store, "tank/data", Some("10M"));

        let lines = executor.describe(&plan);

        assert!(lines[0].contains("tank/data@p-full-20250101010000"));
        assert!(lines.iter().any(|l| l.contains("10M")));
        assert!(lines.iter().any(|l| l.contains("chain-20250101")));
        // Nothing was executed and nothing was written.
        assert!(engine.calls.borrow().is_empty());
        assert!(!temp.path().join("chain-20250101").exists());
        assert!(store.last_chain_pointer().unwrap().is_none());
    }
}
