//! Backup planner
//!
//! Decides whether a requested backup opens a new chain (full capture) or
//! continues the current one (differential against the chain's anchor),
//! from the last-chain pointer, the interval policy, and the current date.
//! Planning reads state but never mutates it; the same plan value drives
//! both dry-run output and live execution.

use chrono::NaiveDateTime;

use crate::engine::SnapshotEngine;
use crate::error::BackupResult;
use crate::state::chain::{snapshot_name, SnapshotKind};
use crate::state::ChainStore;

/// The intended action for one backup invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupPlan {
    /// Take a full snapshot and open a fresh chain named for today
    OpenNewChain {
        chain_name: String,
        snapshot_name: String,
    },
    /// Take a differential against the current chain's full anchor
    ///
    /// Differentials are always relative to the anchor, never to a prior
    /// differential; that matches incremental-send semantics and keeps
    /// any truncated replay valid.
    ContinueChain {
        chain_name: String,
        snapshot_name: String,
        base_snapshot: String,
    },
}

impl BackupPlan {
    /// The snapshot kind this plan produces
    pub fn kind(&self) -> SnapshotKind {
        match self {
            Self::OpenNewChain { .. } => SnapshotKind::Full,
            Self::ContinueChain { .. } => SnapshotKind::Differential,
        }
    }

    /// The chain the capture lands in
    pub fn chain_name(&self) -> &str {
        match self {
            Self::OpenNewChain { chain_name, .. } => chain_name,
            Self::ContinueChain { chain_name, .. } => chain_name,
        }
    }

    /// The snapshot to be created
    pub fn snapshot_name(&self) -> &str {
        match self {
            Self::OpenNewChain { snapshot_name, .. } => snapshot_name,
            Self::ContinueChain { snapshot_name, .. } => snapshot_name,
        }
    }

    /// The base snapshot for a differential, if any
    pub fn base_snapshot(&self) -> Option<&str> {
        match self {
            Self::OpenNewChain { .. } => None,
            Self::ContinueChain { base_snapshot, .. } => Some(base_snapshot),
        }
    }
}

/// Chooses full versus differential for one backup invocation
pub struct BackupPlanner<'a> {
    store: &'a ChainStore,
    interval_days: u32,
    prefix: &'a str,
}

impl<'a> BackupPlanner<'a> {
    /// Create a planner over the given store and interval policy
    pub fn new(store: &'a ChainStore, interval_days: u32, prefix: &'a str) -> Self {
        Self {
            store,
            interval_days,
            prefix,
        }
    }

    /// Decide the action for a backup requested at `now`
    ///
    /// Opens a new chain when no pointer exists, when the pointer's chain
    /// is missing or holds no completed snapshots, or when the chain's
    /// age reached the interval. Otherwise continues the pointed-at
    /// chain. A corrupt pointer or manifest propagates as
    /// `StateCorruption`; it is never guessed around.
    pub fn plan(&self, now: NaiveDateTime) -> BackupResult<BackupPlan> {
        let today = now.date();

        let current = match self.store.last_chain_pointer()? {
            Some(name) => self.store.load_chain(&name)?,
            None => None,
        };

        if let Some(chain) = current {
            let fresh = chain.age_days(today) < i64::from(self.interval_days);
            if fresh && chain.is_restorable() {
                return Ok(BackupPlan::ContinueChain {
                    chain_name: chain.name.clone(),
                    snapshot_name: snapshot_name(self.prefix, SnapshotKind::Differential, now),
                    base_snapshot: chain.anchor.name,
                });
            }
        }

        Ok(BackupPlan::OpenNewChain {
            chain_name: self.store.unique_chain_name(today),
            snapshot_name: snapshot_name(self.prefix, SnapshotKind::Full, now),
        })
    }

    /// Swap a differential plan for a new full chain when its base is gone
    ///
    /// A differential stream is only receivable on top of its base
    /// snapshot; if that snapshot no longer exists on the dataset the
    /// planned capture would be unusable. Returns the replacement plan,
    /// or `None` when the plan needs no base or the base is present.
    /// The replacement chain name never collides with a persisted chain,
    /// including the one being abandoned.
    pub fn escalate_missing_base<E: SnapshotEngine>(
        &self,
        engine: &E,
        dataset: &str,
        plan: &BackupPlan,
        now: NaiveDateTime,
    ) -> BackupResult<Option<BackupPlan>> {
        let base = match plan.base_snapshot() {
            Some(base) => base,
            None => return Ok(None),
        };
        if engine.snapshot_exists(dataset, base)? {
            return Ok(None);
        }
        Ok(Some(BackupPlan::OpenNewChain {
            chain_name: self.store.unique_chain_name(now.date()),
            snapshot_name: snapshot_name(self.prefix, SnapshotKind::Full, now),
        }))
    }
}
