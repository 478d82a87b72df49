//! Chain restore: selection, confirmation, and ordered replay

pub mod confirm;
pub mod executor;
pub mod plan;

pub use confirm::{AssumeYes, Confirm, StdinConfirm};
pub use executor::{RestoreExecutor, RestoreOutcome};
pub use plan::{RestorePlan, RestoreSelector, RestoreStep};
