//! Progress reporting

use crate::types::TaskId;

/// Receives fine-grained progress from the orchestrators.
///
/// All methods default to no-ops so observers only implement what they
/// display. Calls are made from worker tasks, so implementations must be
/// cheap and must not block.
pub trait ProgressSink: Send + Sync {
    /// Human-readable status line (backup subtasks, task boundaries)
    fn on_detail(&self, _detail: &str) {}

    /// Percentage for a single migration task
    fn on_task_progress(&self, _task_id: TaskId, _percent: u8) {}

    /// Overall completion percentage of a backup run
    fn on_overall_progress(&self, _percent: u8) {}
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}
