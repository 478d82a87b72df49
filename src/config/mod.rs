//! Configuration: path layout and policy defaults

pub mod options;
pub mod paths;

pub use paths::BackupPaths;
