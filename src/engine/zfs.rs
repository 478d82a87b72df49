//! ZFS implementation of the snapshot engine
//!
//! Shells out to the ZFS userland tools and wires them into byte-stream
//! pipelines:
//!
//! - backup: `zfs send -R` (`| pv -q -L <rate>`) `| pigz/gzip` → file
//! - restore: `pigz/gzip -dc` `| zfs receive -F`
//! - verify: `pigz/gzip -dc` → first KiB → `zstreamdump -v`
//!
//! Every child's exit status is checked; a non-zero status surfaces as an
//! `Engine` error carrying the command and captured stderr. `pigz` is
//! preferred over `gzip` when it is present and functional; the choice is
//! probed once at construction.

use std::env;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::Read;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::error::{BackupError, BackupResult};

use super::SnapshotEngine;

/// How many decompressed bytes the stream-header check feeds to zstreamdump
const VERIFY_HEADER_BYTES: usize = 1024;

/// Compressor selected at engine construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compressor {
    Pigz,
    Gzip,
}

impl Compressor {
    fn bin(&self) -> &'static str {
        match self {
            Self::Pigz => "pigz",
            Self::Gzip => "gzip",
        }
    }
}

/// Snapshot engine backed by the ZFS command-line tools
pub struct ZfsEngine {
    compressor: Compressor,
}

impl ZfsEngine {
    /// Probe the environment and construct the engine
    pub fn new() -> Self {
        Self {
            compressor: probe_compressor(),
        }
    }

    /// Verify that every binary this engine needs can be found
    ///
    /// `pv` is only required when a rate limit is configured; its absence
    /// otherwise just disables throttling.
    pub fn preflight(&self, rate: Option<&str>) -> BackupResult<()> {
        let mut required = vec!["zfs", "zpool", self.compressor.bin(), "zstreamdump"];
        if rate.is_some() {
            required.push("pv");
        }

        let missing: Vec<&str> = required
            .into_iter()
            .filter(|bin| find_in_path(bin).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BackupError::Config(format!(
                "Missing required binaries: {}",
                missing.join(" ")
            )))
        }
    }

    fn decompress_cmd(&self, file: &Path) -> Command {
        let mut cmd = Command::new(self.compressor.bin());
        cmd.arg("-dc").arg(file);
        cmd
    }

    /// Run a command to completion, succeeding iff its status is zero
    fn run_status(&self, mut cmd: Command, what: &str) -> BackupResult<bool> {
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| BackupError::engine(what, "failed to spawn", e.to_string()))?;
        Ok(output.status.success())
    }

    /// Run a command, mapping a non-zero exit to an engine error
    fn run_checked(&self, mut cmd: Command, what: &str) -> BackupResult<()> {
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| BackupError::engine(what, "failed to spawn", e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(BackupError::engine(
                what,
                output.status.to_string(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

impl Default for ZfsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotEngine for ZfsEngine {
    fn dataset_exists(&self, dataset: &str) -> BackupResult<bool> {
        let mut cmd = Command::new("zfs");
        cmd.args(["list", dataset]);
        self.run_status(cmd, "zfs list")
    }

    fn pool_exists(&self, pool: &str) -> BackupResult<bool> {
        let mut cmd = Command::new("zpool");
        cmd.args(["list", pool]);
        self.run_status(cmd, "zpool list")
    }

    fn snapshot_exists(&self, dataset: &str, snapshot: &str) -> BackupResult<bool> {
        let mut cmd = Command::new("zfs");
        cmd.args(["list", "-t", "snapshot", &format!("{}@{}", dataset, snapshot)]);
        self.run_status(cmd, "zfs list -t snapshot")
    }

    fn create_snapshot(&self, dataset: &str, snapshot: &str) -> BackupResult<()> {
        let mut cmd = Command::new("zfs");
        cmd.args(["snapshot", "-r", &format!("{}@{}", dataset, snapshot)]);
        self.run_checked(cmd, "zfs snapshot")
    }

    fn destroy_snapshot(&self, dataset: &str, snapshot: &str) -> BackupResult<()> {
        let mut cmd = Command::new("zfs");
        cmd.args(["destroy", "-r", &format!("{}@{}", dataset, snapshot)]);
        self.run_checked(cmd, "zfs destroy")
    }

    fn list_snapshots(&self, dataset: &str) -> BackupResult<Vec<String>> {
        let output = Command::new("zfs")
            .args(["list", "-t", "snapshot", "-o", "name", "-s", "creation", "-H", "-r", dataset])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| BackupError::engine("zfs list -t snapshot", "failed to spawn", e.to_string()))?;
        if !output.status.success() {
            return Err(BackupError::engine(
                "zfs list -t snapshot",
                output.status.to_string(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        // Lines look like "tank/data@snapname"; keep the snapshot part.
        let names = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.split('@').nth(1))
            .map(str::to_string)
            .collect();
        Ok(names)
    }

    fn create_dataset(&self, dataset: &str) -> BackupResult<()> {
        let mut cmd = Command::new("zfs");
        cmd.args(["create", dataset]);
        self.run_checked(cmd, "zfs create")
    }

    fn serialize_to_file(
        &self,
        dataset: &str,
        snapshot: &str,
        base: Option<&str>,
        out: &Path,
        rate: Option<&str>,
    ) -> BackupResult<u64> {
        let out_file = File::create(out)
            .map_err(|e| BackupError::Io(format!("Failed to create {}: {}", out.display(), e)))?;

        let mut send_cmd = Command::new("zfs");
        send_cmd.arg("send").arg("-R");
        if let Some(base) = base {
            send_cmd.args(["-i", base]);
        }
        send_cmd.arg(format!("{}@{}", dataset, snapshot));

        let mut send = send_cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackupError::engine("zfs send", "failed to spawn", e.to_string()))?;
        let send_stdout = send
            .stdout
            .take()
            .ok_or_else(|| BackupError::engine("zfs send", "no stdout", "pipe unavailable"))?;

        // Optional rate limiter between send and the compressor.
        let (mut limiter, compress_input) = match rate {
            Some(rate) => {
                let mut pv = Command::new("pv")
                    .args(["-q", "-L", rate])
                    .stdin(Stdio::from(send_stdout))
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(|e| BackupError::engine("pv", "failed to spawn", e.to_string()))?;
                let pv_stdout = pv
                    .stdout
                    .take()
                    .ok_or_else(|| BackupError::engine("pv", "no stdout", "pipe unavailable"))?;
                (Some(pv), Stdio::from(pv_stdout))
            }
            None => (None, Stdio::from(send_stdout)),
        };

        let compress = Command::new(self.compressor.bin())
            .stdin(compress_input)
            .stdout(Stdio::from(out_file))
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BackupError::engine(self.compressor.bin(), "failed to spawn", e.to_string())
            })?;

        // Downstream first: the compressor exits once its input closes.
        let compress_result = wait_child(self.compressor.bin(), compress);
        let limiter_result = match limiter.take() {
            Some(pv) => wait_child("pv", pv),
            None => Ok(()),
        };
        let send_result = wait_child("zfs send", send);

        // Report the most upstream failure first; it is the root cause.
        send_result.and(limiter_result).and(compress_result)?;

        let size = fs::metadata(out)
            .map_err(|e| BackupError::Io(format!("Failed to stat {}: {}", out.display(), e)))?
            .len();
        Ok(size)
    }

    fn verify_stream_file(&self, file: &Path) -> BackupResult<bool> {
        if !file.exists() {
            return Ok(false);
        }

        let mut gunzip = self
            .decompress_cmd(file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                BackupError::engine(self.compressor.bin(), "failed to spawn", e.to_string())
            })?;
        let mut gunzip_stdout = gunzip
            .stdout
            .take()
            .ok_or_else(|| {
                BackupError::engine(self.compressor.bin(), "no stdout", "pipe unavailable")
            })?;

        let mut header = vec![0u8; VERIFY_HEADER_BYTES];
        let mut filled = 0;
        while filled < header.len() {
            match gunzip_stdout.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    let _ = gunzip.kill();
                    let _ = gunzip.wait();
                    return Err(BackupError::Io(format!(
                        "Failed to read decompressed stream: {}",
                        e
                    )));
                }
            }
        }
        header.truncate(filled);
        drop(gunzip_stdout);
        // We only wanted the header; stop the decompressor and reap it.
        let _ = gunzip.kill();
        let _ = gunzip.wait();

        if header.is_empty() {
            return Ok(false);
        }

        let mut dump = Command::new("zstreamdump")
            .arg("-v")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BackupError::engine("zstreamdump", "failed to spawn", e.to_string()))?;
        if let Some(mut stdin) = dump.stdin.take() {
            // zstreamdump may exit as soon as it has the header; a broken
            // pipe here is not an error.
            let _ = stdin.write_all(&header);
        }
        let status = dump
            .wait()
            .map_err(|e| BackupError::engine("zstreamdump", "wait failed", e.to_string()))?;
        Ok(status.success())
    }

    fn materialize_from_file(&self, file: &Path, dataset: &str) -> BackupResult<()> {
        let mut gunzip = self
            .decompress_cmd(file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BackupError::engine(self.compressor.bin(), "failed to spawn", e.to_string())
            })?;
        let gunzip_stdout = gunzip
            .stdout
            .take()
            .ok_or_else(|| {
                BackupError::engine(self.compressor.bin(), "no stdout", "pipe unavailable")
            })?;

        let receive = Command::new("zfs")
            .args(["receive", "-F", dataset])
            .stdin(Stdio::from(gunzip_stdout))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackupError::engine("zfs receive", "failed to spawn", e.to_string()))?;

        let receive_result = wait_child("zfs receive", receive);
        let gunzip_result = wait_child(self.compressor.bin(), gunzip);

        gunzip_result.and(receive_result)
    }
}

/// Wait for a child and map a non-zero exit to an engine error with its stderr
fn wait_child(what: &str, child: Child) -> BackupResult<()> {
    let output = child
        .wait_with_output()
        .map_err(|e| BackupError::engine(what, "wait failed", e.to_string()))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(BackupError::engine(
            what,
            output.status.to_string(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

/// Locate a binary on PATH
fn find_in_path(name: impl AsRef<OsStr>) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name.as_ref()))
        .find(|candidate| candidate.is_file())
}

/// Prefer pigz when it is present and answers `--version`
fn probe_compressor() -> Compressor {
    if find_in_path("pigz").is_some() {
        let works = Command::new("pigz")
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if works {
            return Compressor::Pigz;
        }
    }
    Compressor::Gzip
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_in_path_finds_sh() {
        assert!(find_in_path("sh").is_some());
    }

    #[test]
    fn test_find_in_path_misses_nonsense() {
        assert!(find_in_path("definitely-not-a-real-binary-zfs-chain").is_none());
    }

    #[test]
    fn test_probe_compressor_returns_some_compressor() {
        // Environment-dependent; only check it does not panic and yields
        // one of the two known compressors.
        let c = probe_compressor();
        assert!(matches!(c, Compressor::Pigz | Compressor::Gzip));
    }

    #[test]
    fn test_preflight_reports_missing_pv_only_with_rate() {
        let engine = ZfsEngine::new();
        // Whatever the environment, a configured rate can only add "pv"
        // to the missing set, never remove entries.
        let without_rate = engine.preflight(None);
        let with_rate = engine.preflight(Some("10M"));
        if without_rate.is_ok() {
            if let Err(BackupError::Config(msg)) = with_rate {
                assert!(msg.contains("pv"));
            }
        }
    }

    #[test]
    fn test_verify_missing_file_is_false() {
        let engine = ZfsEngine::new();
        let verdict = engine
            .verify_stream_file(Path::new("/nonexistent/zfs-chain-test.zfs.gz"))
            .unwrap();
        assert!(!verdict);
    }
}
