//! Chain State Store
//!
//! Persists chain membership and the last-chain pointer, and owns every
//! mutation of both. Executors only append or read snapshot records
//! through this type; nothing else touches chain structure.
//!
//! Layout: each chain directory holds a `manifest.json` with the chain
//! record; the destination root holds a plain-text `last_chain` pointer.
//! A manifest is written only once its full anchor completed, so any
//! persisted chain satisfies the one-anchor invariant. Manifest writes
//! are atomic (temp file + rename). A manifest that exists but fails to
//! parse or validate is surfaced as `StateCorruption`, never repaired.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::config::paths::{BackupPaths, MANIFEST_FILE};
use crate::error::{BackupError, BackupResult};

use super::chain::{
    chain_name_with_ordinal, parse_chain_date, parse_chain_name, Chain, SnapshotKind,
    SnapshotRecord,
};

/// Read-side and write-side access to persisted chain state
pub struct ChainStore {
    paths: BackupPaths,
}

impl ChainStore {
    /// Create a store over a backup destination layout
    pub fn new(paths: BackupPaths) -> Self {
        Self { paths }
    }

    /// The layout this store persists into
    pub fn paths(&self) -> &BackupPaths {
        &self.paths
    }

    /// All chains with a manifest, sorted by creation date (oldest first)
    ///
    /// Chain directories without a manifest are skipped: they are the
    /// residue of a backup that never completed its anchor and hold no
    /// records. A manifest that fails to parse or validate is an error.
    pub fn chains(&self) -> BackupResult<Vec<Chain>> {
        let target = self.paths.target_dir();
        if !target.is_dir() {
            return Ok(Vec::new());
        }

        let mut chains = Vec::new();
        for entry in fs::read_dir(target)
            .map_err(|e| BackupError::Io(format!("Failed to read backup directory: {}", e)))?
        {
            let entry =
                entry.map_err(|e| BackupError::Io(format!("Failed to read directory entry: {}", e)))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if parse_chain_date(&name).is_none() || !entry.path().is_dir() {
                continue;
            }
            if let Some(chain) = self.load_chain(&name)? {
                chains.push(chain);
            }
        }

        // Chain names embed the creation date and a same-day ordinal;
        // sort on the parsed pair so ordinal 10 follows ordinal 9.
        chains.sort_by_key(|c| parse_chain_name(&c.name));
        Ok(chains)
    }

    /// Load one chain by name; `None` when the directory or manifest is absent
    pub fn load_chain(&self, name: &str) -> BackupResult<Option<Chain>> {
        let manifest = self.paths.manifest_file(name);
        if !manifest.exists() {
            return Ok(None);
        }

        let chain: Chain = read_json(&manifest).map_err(|e| {
            BackupError::StateCorruption(format!("chain manifest {}: {}", manifest.display(), e))
        })?;

        if chain.name != name {
            return Err(BackupError::StateCorruption(format!(
                "chain manifest {} names chain {}",
                manifest.display(),
                chain.name
            )));
        }
        chain
            .validate()
            .map_err(BackupError::StateCorruption)?;
        Ok(Some(chain))
    }

    /// The most recent chain by creation date, if any
    pub fn latest_chain(&self) -> BackupResult<Option<Chain>> {
        Ok(self.chains()?.into_iter().last())
    }

    /// Read the last-chain pointer
    ///
    /// `None` when no backup has ever run. A pointer file whose content
    /// is not a well-formed chain name fails loud as `StateCorruption`.
    pub fn last_chain_pointer(&self) -> BackupResult<Option<String>> {
        let pointer = self.paths.last_chain_file();
        if !pointer.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&pointer).map_err(|e| {
            BackupError::StateCorruption(format!(
                "last-chain pointer {} unreadable: {}",
                pointer.display(),
                e
            ))
        })?;
        let name = content.trim();
        if parse_chain_date(name).is_none() {
            return Err(BackupError::StateCorruption(format!(
                "last-chain pointer {} holds invalid chain name {:?}",
                pointer.display(),
                name
            )));
        }
        Ok(Some(name.to_string()))
    }

    /// Record a newly completed chain and advance the pointer to it
    ///
    /// Called by the backup executor only after the anchor's backing file
    /// was atomically finalized. A chain name that is already persisted
    /// is refused: overwriting would silently drop that chain's records,
    /// so callers pick a free name via [`Self::unique_chain_name`].
    pub fn create_chain(&self, chain: &Chain) -> BackupResult<()> {
        if chain.anchor.kind != SnapshotKind::Full || !chain.anchor.complete {
            return Err(BackupError::StateCorruption(format!(
                "refusing to record chain {} without a completed full anchor",
                chain.name
            )));
        }
        chain.validate().map_err(BackupError::StateCorruption)?;
        if self.paths.manifest_file(&chain.name).exists() {
            return Err(BackupError::StateCorruption(format!(
                "refusing to overwrite existing chain {}",
                chain.name
            )));
        }

        self.write_manifest(chain)?;
        self.set_last_chain_pointer(&chain.name)
    }

    /// The first chain name for `date` that no persisted chain holds
    ///
    /// `chain-YYYYMMDD` when free, otherwise `chain-YYYYMMDD-2` and so
    /// on. Same-day collisions happen when a chain is replaced within
    /// its own opening day, e.g. after its anchor snapshot vanished.
    pub fn unique_chain_name(&self, date: chrono::NaiveDate) -> String {
        let mut ordinal = 1;
        loop {
            let name = chain_name_with_ordinal(date, ordinal);
            if !self.paths.manifest_file(&name).exists() {
                return name;
            }
            ordinal += 1;
        }
    }

    /// Append a completed differential to an existing chain
    pub fn append_differential(
        &self,
        chain_name: &str,
        record: SnapshotRecord,
    ) -> BackupResult<Chain> {
        if record.kind != SnapshotKind::Differential || !record.complete {
            return Err(BackupError::StateCorruption(format!(
                "refusing to record incomplete or non-differential snapshot {}",
                record.name
            )));
        }

        let mut chain = self.load_chain(chain_name)?.ok_or_else(|| {
            BackupError::StateCorruption(format!(
                "cannot append to chain {}: manifest missing",
                chain_name
            ))
        })?;

        if record.parent.as_deref() != Some(chain.anchor.name.as_str()) {
            return Err(BackupError::StateCorruption(format!(
                "differential {} is not anchored to {}",
                record.name, chain.anchor.name
            )));
        }

        chain.diffs.push(record);
        self.write_manifest(&chain)?;
        Ok(chain)
    }

    /// Remove a chain's directory and all files beneath it
    ///
    /// Retention calls this after the backing files were removed; the
    /// manifest goes away with the directory. Refuses paths outside the
    /// backup root.
    pub fn remove_chain(&self, name: &str) -> BackupResult<()> {
        let dir = self.paths.chain_dir(name);
        if !dir.exists() {
            return Ok(());
        }
        if !self.paths.contains(&dir) {
            return Err(BackupError::Io(format!(
                "refusing to delete {} outside the backup directory",
                dir.display()
            )));
        }
        fs::remove_dir_all(&dir)
            .map_err(|e| BackupError::Io(format!("Failed to remove {}: {}", dir.display(), e)))?;
        Ok(())
    }

    fn write_manifest(&self, chain: &Chain) -> BackupResult<()> {
        write_json_atomic(&self.paths.manifest_file(&chain.name), chain)
    }

    fn set_last_chain_pointer(&self, name: &str) -> BackupResult<()> {
        self.paths.ensure_target_dir()?;
        let pointer = self.paths.last_chain_file();
        let temp = pointer.with_extension("tmp");
        fs::write(&temp, format!("{}\n", name))
            .map_err(|e| BackupError::Io(format!("Failed to write last-chain pointer: {}", e)))?;
        fs::rename(&temp, &pointer)
            .map_err(|e| BackupError::Io(format!("Failed to finalize last-chain pointer: {}", e)))?;
        Ok(())
    }
}

/// Read JSON from a file
pub fn read_json<T, P>(path: P) -> BackupResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| BackupError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| BackupError::Json(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write JSON to a file atomically (write to temp, then rename)
///
/// The file is either completely written or not modified at all.
pub fn write_json_atomic<T, P>(path: P, data: &T) -> BackupResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    // Temp file must live in the same directory for the rename to be atomic.
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            BackupError::Io(format!("Failed to create directory {}: {}", parent.display(), e))
        })?;
    }
    let temp_path = path.with_extension("json.tmp");

    {
        let file = File::create(&temp_path).map_err(|e| {
            BackupError::Io(format!("Failed to create {}: {}", temp_path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, data)
            .map_err(|e| BackupError::Json(format!("Failed to serialize {}: {}", path.display(), e)))?;
        writer
            .flush()
            .map_err(|e| BackupError::Io(format!("Failed to flush {}: {}", temp_path.display(), e)))?;
    }

    fs::rename(&temp_path, path)
        .map_err(|e| BackupError::Io(format!("Failed to finalize {}: {}", path.display(), e)))?;
    Ok(())
}

/// Check whether a chain directory still lacks a manifest
pub fn is_manifestless_dir(dir: &Path) -> bool {
    dir.is_dir() && !dir.join(MANIFEST_FILE).exists()
}
