//! Event log entry data structures
//!
//! Defines the structure of event log entries: which operation ran,
//! how it ended, and what it touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operations that write to the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Backup,
    Restore,
    Cleanup,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Backup => write!(f, "backup"),
            EventKind::Restore => write!(f, "restore"),
            EventKind::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// How an operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    Succeeded,
    Failed,
}

/// A single event log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// When the operation finished (UTC)
    pub timestamp: DateTime<Utc>,

    pub kind: EventKind,

    pub outcome: EventOutcome,

    /// Source dataset the operation ran against
    pub dataset: String,

    /// Chain involved, when one was resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,

    /// Snapshot produced or targeted, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,

    /// Failure detail or summary line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EventRecord {
    pub fn succeeded(kind: EventKind, dataset: impl Into<String>) -> Self {
        Self::new(kind, EventOutcome::Succeeded, dataset)
    }

    pub fn failed(kind: EventKind, dataset: impl Into<String>, message: impl Into<String>) -> Self {
        let mut record = Self::new(kind, EventOutcome::Failed, dataset);
        record.message = Some(message.into());
        record
    }

    fn new(kind: EventKind, outcome: EventOutcome, dataset: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            outcome,
            dataset: dataset.into(),
            chain: None,
            snapshot: None,
            message: None,
        }
    }

    pub fn with_chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = Some(chain.into());
        self
    }

    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot = Some(snapshot.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeded_record_omits_empty_fields() {
        let record = EventRecord::succeeded(EventKind::Backup, "tank/data");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"backup\""));
        assert!(json.contains("\"outcome\":\"succeeded\""));
        assert!(!json.contains("chain"));
        assert!(!json.contains("message"));
    }

    #[test]
    fn test_failed_record_carries_message() {
        let record = EventRecord::failed(EventKind::Restore, "tank/data", "stream error")
            .with_chain("chain-20250101");
        assert_eq!(record.outcome, EventOutcome::Failed);
        assert_eq!(record.message.as_deref(), Some("stream error"));
        assert_eq!(record.chain.as_deref(), Some("chain-20250101"));
    }

    #[test]
    fn test_round_trips_through_json() {
        let record = EventRecord::succeeded(EventKind::Cleanup, "tank/data")
            .with_message("2 chains pruned");
        let json = serde_json::to_string(&record).unwrap();
        let parsed: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, EventKind::Cleanup);
        assert_eq!(parsed.message.as_deref(), Some("2 chains pruned"));
    }
}
