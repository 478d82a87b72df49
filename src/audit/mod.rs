//! Append-only run history
//!
//! Every backup, restore, and cleanup run appends one line to
//! `events.log` at the destination root, recording what ran and how it
//! ended.

pub mod entry;
pub mod logger;

pub use entry::{EventKind, EventOutcome, EventRecord};
pub use logger::EventLog;
