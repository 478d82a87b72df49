//! Default policy values shared by the CLI flags

/// Days between full backups before a new chain is opened
pub const DEFAULT_INTERVAL_DAYS: u32 = 7;

/// Number of chains preserved by retention
pub const DEFAULT_RETENTION_CHAINS: u32 = 2;

/// Snapshot and file name prefix
pub const DEFAULT_PREFIX: &str = "zfs-chain";
