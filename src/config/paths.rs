//! Path layout for a backup destination
//!
//! All on-disk state for one dataset lives under
//! `<mount point>/<sanitized dataset name>/`:
//!
//! - `chain-YYYYMMDD/` — one directory per chain, holding the compressed
//!   snapshot files and the chain manifest
//! - `last_chain` — plain-text pointer to the chain new backups extend
//! - `events.log` — append-only JSONL event log

use std::path::{Path, PathBuf};

use crate::error::{BackupError, BackupResult};

/// Name of the chain manifest file inside each chain directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Name of the last-chain pointer file at the destination root
pub const LAST_CHAIN_FILE: &str = "last_chain";

/// Name of the event log file at the destination root
pub const EVENT_LOG_FILE: &str = "events.log";

/// Resolves every path used for one dataset's backups
#[derive(Debug, Clone)]
pub struct BackupPaths {
    /// `<mount point>/<sanitized dataset>`
    target_dir: PathBuf,
}

impl BackupPaths {
    /// Create a layout rooted at `mount_point` for `dataset`
    ///
    /// # Errors
    ///
    /// Returns `Config` when the dataset name or mount point fails
    /// validation.
    pub fn new(mount_point: &Path, dataset: &str) -> BackupResult<Self> {
        validate_dataset_name(dataset)?;
        validate_mount_point(mount_point)?;
        Ok(Self {
            target_dir: mount_point.join(sanitize_dataset_name(dataset)),
        })
    }

    /// Create a layout with an explicit target directory (useful for testing)
    pub fn with_target_dir(target_dir: PathBuf) -> Self {
        Self { target_dir }
    }

    /// The per-dataset backup root
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Directory for one chain
    pub fn chain_dir(&self, chain_name: &str) -> PathBuf {
        self.target_dir.join(chain_name)
    }

    /// Manifest path for one chain
    pub fn manifest_file(&self, chain_name: &str) -> PathBuf {
        self.chain_dir(chain_name).join(MANIFEST_FILE)
    }

    /// Backing file path for a snapshot inside its chain
    pub fn snapshot_file(&self, chain_name: &str, file_name: &str) -> PathBuf {
        self.chain_dir(chain_name).join(file_name)
    }

    /// The last-chain pointer file
    pub fn last_chain_file(&self) -> PathBuf {
        self.target_dir.join(LAST_CHAIN_FILE)
    }

    /// The event log file
    pub fn event_log(&self) -> PathBuf {
        self.target_dir.join(EVENT_LOG_FILE)
    }

    /// Ensure the backup root exists
    pub fn ensure_target_dir(&self) -> BackupResult<()> {
        std::fs::create_dir_all(&self.target_dir)
            .map_err(|e| BackupError::Io(format!("Failed to create backup directory: {}", e)))?;
        Ok(())
    }

    /// Check that `path` resolves inside the backup root
    ///
    /// Deletions (retention, temp-file sweep) refuse to touch anything
    /// outside this boundary.
    pub fn contains(&self, path: &Path) -> bool {
        let root = match self.target_dir.canonicalize() {
            Ok(p) => p,
            Err(_) => return false,
        };
        let resolved = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => return false,
        };
        resolved == root || resolved.starts_with(&root)
    }
}

/// Validate a ZFS dataset name
///
/// Rejects empty names, path traversal, characters outside the ZFS
/// dataset charset, and names longer than the ZFS limit.
pub fn validate_dataset_name(dataset: &str) -> BackupResult<()> {
    if dataset.is_empty() {
        return Err(BackupError::Config("Dataset name cannot be empty".into()));
    }
    if dataset.contains("..") || dataset.starts_with('/') {
        return Err(BackupError::Config(
            "Dataset name contains invalid path components".into(),
        ));
    }
    if !dataset
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.' | ':'))
    {
        return Err(BackupError::Config(
            "Dataset name contains invalid characters".into(),
        ));
    }
    if dataset.len() > 256 {
        return Err(BackupError::Config("Dataset name too long".into()));
    }
    Ok(())
}

/// Validate a mount point path
pub fn validate_mount_point(mount_point: &Path) -> BackupResult<()> {
    if mount_point.as_os_str().is_empty() {
        return Err(BackupError::Config("Mount point cannot be empty".into()));
    }
    if !mount_point.is_absolute() {
        return Err(BackupError::Config(
            "Mount point must be an absolute path".into(),
        ));
    }
    Ok(())
}

/// Convert a dataset name to a safe directory name
///
/// Slashes become underscores; any remaining problematic characters are
/// dropped.
pub fn sanitize_dataset_name(dataset: &str) -> String {
    dataset
        .replace('/', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let paths = BackupPaths::new(Path::new("/mnt/backups"), "tank/data").unwrap();
        assert_eq!(paths.target_dir(), Path::new("/mnt/backups/tank_data"));
        assert_eq!(
            paths.chain_dir("chain-20250101"),
            Path::new("/mnt/backups/tank_data/chain-20250101")
        );
        assert_eq!(
            paths.manifest_file("chain-20250101"),
            Path::new("/mnt/backups/tank_data/chain-20250101/manifest.json")
        );
        assert_eq!(
            paths.last_chain_file(),
            Path::new("/mnt/backups/tank_data/last_chain")
        );
    }

    #[test]
    fn test_validate_dataset_name() {
        assert!(validate_dataset_name("tank/data").is_ok());
        assert!(validate_dataset_name("rpool").is_ok());
        assert!(validate_dataset_name("").is_err());
        assert!(validate_dataset_name("/tank").is_err());
        assert!(validate_dataset_name("tank/../etc").is_err());
        assert!(validate_dataset_name("tank;rm -rf").is_err());
        assert!(validate_dataset_name(&"a".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_mount_point() {
        assert!(validate_mount_point(Path::new("/mnt/backups")).is_ok());
        assert!(validate_mount_point(Path::new("relative/path")).is_err());
        assert!(validate_mount_point(Path::new("")).is_err());
    }

    #[test]
    fn test_sanitize_dataset_name() {
        assert_eq!(sanitize_dataset_name("tank/data"), "tank_data");
        assert_eq!(sanitize_dataset_name("rpool"), "rpool");
        assert_eq!(sanitize_dataset_name("a/b;c"), "a_bc");
    }

    #[test]
    fn test_contains() {
        let temp = TempDir::new().unwrap();
        let paths = BackupPaths::with_target_dir(temp.path().to_path_buf());

        let inside = temp.path().join("chain-20250101");
        std::fs::create_dir_all(&inside).unwrap();
        assert!(paths.contains(&inside));
        assert!(paths.contains(temp.path()));

        let outside = TempDir::new().unwrap();
        assert!(!paths.contains(outside.path()));
    }
}
