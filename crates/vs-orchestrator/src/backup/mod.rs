//! Backup pipeline

mod orchestrator;
mod task;

pub use orchestrator::{BackupError, BackupOrchestrator, MANIFEST_FILE};
pub use task::{BackupOutcome, BackupSummary, BackupTask};
