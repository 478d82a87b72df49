//! Custom error types for zfs-chain
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions. Each variant corresponds to a distinct,
//! reportable failure condition; none are silently swallowed by the core.

use thiserror::Error;

/// The main error type for zfs-chain operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Invalid or contradictory configuration; raised before any state mutation
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Last-chain pointer or chain manifest unreadable or inconsistent.
    /// Surfaced as-is; the store never repairs or guesses.
    #[error("State corruption: {0}")]
    StateCorruption(String),

    /// A child snapshot/compression/rate-limit process failed
    #[error("Engine failure: {command} {status}: {detail}")]
    Engine {
        command: String,
        status: String,
        detail: String,
    },

    /// Restore target chain or snapshot not found; raised before any
    /// destructive call
    #[error("Selection error: {0}")]
    Selection(String),

    /// One or more deletions failed during retention; reconciliation
    /// continued for the remaining chains
    #[error("Partial cleanup failure: {0}")]
    PartialCleanup(String),

    /// The user declined the confirmation prompt
    #[error("Aborted by user")]
    Aborted,
}

impl BackupError {
    /// Create an engine failure from a command description and exit status
    pub fn engine(
        command: impl Into<String>,
        status: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Engine {
            command: command.into(),
            status: status.into(),
            detail: detail.into(),
        }
    }

    /// Create a "not found" selection error for chains
    pub fn chain_not_found(identifier: impl Into<String>) -> Self {
        Self::Selection(format!("chain not found: {}", identifier.into()))
    }

    /// Create a "not found" selection error for restore targets
    pub fn snapshot_not_found(identifier: impl Into<String>) -> Self {
        Self::Selection(format!("snapshot not found in chain: {}", identifier.into()))
    }

    /// Check if this is a selection error
    pub fn is_selection(&self) -> bool {
        matches!(self, Self::Selection(_))
    }

    /// Check if this is a state corruption error
    pub fn is_state_corruption(&self) -> bool {
        matches!(self, Self::StateCorruption(_))
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for zfs-chain operations
pub type BackupResult<T> = Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackupError::Config("contradictory flags".into());
        assert_eq!(err.to_string(), "Configuration error: contradictory flags");
    }

    #[test]
    fn test_engine_error() {
        let err = BackupError::engine("zfs send", "exit status: 1", "cannot open 'tank'");
        assert_eq!(
            err.to_string(),
            "Engine failure: zfs send exit status: 1: cannot open 'tank'"
        );
    }

    #[test]
    fn test_chain_not_found() {
        let err = BackupError::chain_not_found("chain-20240101");
        assert_eq!(
            err.to_string(),
            "Selection error: chain not found: chain-20240101"
        );
        assert!(err.is_selection());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BackupError = io_err.into();
        assert!(matches!(err, BackupError::Io(_)));
    }
}
