//! Chain and snapshot record data models
//!
//! A chain is one full snapshot (the anchor) plus the differentials taken
//! against it, grouped under a `chain-YYYYMMDD` directory. Differentials
//! are ordered by insertion, which is also their chronological and replay
//! order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format used in snapshot names and backing file names
pub const SNAPSHOT_TS_FORMAT: &str = "%Y%m%d%H%M%S";

/// Date format used in chain names
pub const CHAIN_DATE_FORMAT: &str = "%Y%m%d";

/// Extension for compressed snapshot stream files
pub const STREAM_FILE_EXT: &str = ".zfs.gz";

/// Kind of captured snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Self-contained, parent-less capture
    Full,
    /// Capture expressed relative to the chain's full anchor
    Differential,
}

impl SnapshotKind {
    /// Short tag used in snapshot and file names ("full" / "diff")
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Differential => "diff",
        }
    }
}

/// One captured point-in-time state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Snapshot name, e.g. `zfs-chain-full-20250101010101`
    pub name: String,
    /// Full or differential
    pub kind: SnapshotKind,
    /// The chain's anchor for differentials; None for the anchor itself
    pub parent: Option<String>,
    /// Backing file name, relative to the chain directory
    pub file_name: String,
    /// Size of the finalized backing file
    pub size_bytes: u64,
    /// Set only after the backing file has been atomically finalized
    pub complete: bool,
    /// When the snapshot was captured
    pub created_at: DateTime<Utc>,
}

impl SnapshotRecord {
    /// The timestamp portion of the snapshot name, if present
    pub fn timestamp(&self) -> Option<&str> {
        let marker = format!("-{}-", self.kind.tag());
        self.name.rfind(&marker).map(|i| &self.name[i + marker.len()..])
    }
}

/// One named unit of backup history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    /// `chain-YYYYMMDD` (plus an ordinal suffix for later same-day
    /// chains), derived from the date the chain was opened
    pub name: String,
    /// Date the chain was opened
    pub created_on: NaiveDate,
    /// The single full anchor; created before any differential
    pub anchor: SnapshotRecord,
    /// Differentials in insertion (= chronological = replay) order
    pub diffs: Vec<SnapshotRecord>,
}

impl Chain {
    /// All records in replay order: anchor first, then differentials
    pub fn records(&self) -> impl Iterator<Item = &SnapshotRecord> {
        std::iter::once(&self.anchor).chain(self.diffs.iter())
    }

    /// All completed records in replay order
    pub fn completed_records(&self) -> Vec<&SnapshotRecord> {
        self.records().filter(|r| r.complete).collect()
    }

    /// A chain is selectable for restore only when its anchor completed
    pub fn is_restorable(&self) -> bool {
        self.anchor.complete
    }

    /// Whole days elapsed since the chain was opened
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.created_on).num_days()
    }

    /// Check internal consistency: anchor kind, differential parentage
    ///
    /// Every differential must be anchored to the chain's single full
    /// snapshot, never to another differential.
    pub fn validate(&self) -> Result<(), String> {
        if parse_chain_date(&self.name).is_none() {
            return Err(format!("invalid chain name: {}", self.name));
        }
        if self.anchor.kind != SnapshotKind::Full {
            return Err(format!("chain {} anchor is not a full snapshot", self.name));
        }
        if self.anchor.parent.is_some() {
            return Err(format!("chain {} anchor has a parent", self.name));
        }
        for diff in &self.diffs {
            if diff.kind != SnapshotKind::Differential {
                return Err(format!(
                    "chain {} contains a second full snapshot: {}",
                    self.name, diff.name
                ));
            }
            if diff.parent.as_deref() != Some(self.anchor.name.as_str()) {
                return Err(format!(
                    "differential {} is not anchored to {}",
                    diff.name, self.anchor.name
                ));
            }
        }
        Ok(())
    }
}

/// Chain name for a given date: `chain-YYYYMMDD`
///
/// When more than one chain opens on the same day the later ones carry
/// an ordinal suffix (`chain-YYYYMMDD-2`, `-3`, ...); see
/// [`chain_name_with_ordinal`].
pub fn chain_name_for(date: NaiveDate) -> String {
    format!("chain-{}", date.format(CHAIN_DATE_FORMAT))
}

/// Chain name for the nth chain opened on one day (1 has no suffix)
pub fn chain_name_with_ordinal(date: NaiveDate, ordinal: u32) -> String {
    if ordinal <= 1 {
        chain_name_for(date)
    } else {
        format!("chain-{}-{}", date.format(CHAIN_DATE_FORMAT), ordinal)
    }
}

/// Parse the creation date out of a chain name
pub fn parse_chain_date(name: &str) -> Option<NaiveDate> {
    parse_chain_name(name).map(|(date, _)| date)
}

/// Parse a chain name into its date and same-day ordinal
///
/// `chain-20250101` is ordinal 1; `chain-20250101-2` is ordinal 2.
/// Anything else is not a chain name.
pub fn parse_chain_name(name: &str) -> Option<(NaiveDate, u32)> {
    let rest = name.strip_prefix("chain-")?;
    let (date_part, ordinal) = match rest.len() {
        8 => (rest, 1),
        n if n > 9 => {
            let (date_part, suffix) = rest.split_at(8);
            let digits = suffix.strip_prefix('-')?;
            let ordinal: u32 = digits.parse().ok()?;
            if ordinal < 2 || digits.starts_with('0') {
                return None;
            }
            (date_part, ordinal)
        }
        _ => return None,
    };
    let date = NaiveDate::parse_from_str(date_part, CHAIN_DATE_FORMAT).ok()?;
    Some((date, ordinal))
}

/// Snapshot name for a capture at `at`: `<prefix>-<full|diff>-<timestamp>`
pub fn snapshot_name(prefix: &str, kind: SnapshotKind, at: NaiveDateTime) -> String {
    format!("{}-{}-{}", prefix, kind.tag(), at.format(SNAPSHOT_TS_FORMAT))
}

/// Backing file name for a snapshot
pub fn stream_file_name(snapshot: &str) -> String {
    format!("{}{}", snapshot, STREAM_FILE_EXT)
}
