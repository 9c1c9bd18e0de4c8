//! Migration scheduling
//!
//! [`MigrationOrchestrator`] turns a selection of objects into tracked tasks
//! and runs them with bounded concurrency and retry. Task state lives in a
//! [`TaskBoard`] that observers read through snapshots.

mod board;
mod classify;
mod orchestrator;
mod task;

pub use board::TaskBoard;
pub use classify::FailureClass;
pub use orchestrator::{MigrationError, MigrationOrchestrator, MigrationReport};
pub use task::{MigrationStatus, MigrationTask};
