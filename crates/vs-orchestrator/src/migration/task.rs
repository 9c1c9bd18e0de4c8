//! Migration task model

use serde::Serialize;
use std::fmt;

use vs_core::types::{ObjectType, TaskId};

/// Lifecycle of a migration task.
///
/// ```text
/// Pending -> Queued -> InProgress -> Completed | Failed | Cancelled
/// ```
///
/// Retries happen inside `InProgress`. Pending and Queued tasks may be
/// cancelled directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl MigrationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MigrationStatus::Completed | MigrationStatus::Failed | MigrationStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is legal
    pub fn can_transition_to(self, next: MigrationStatus) -> bool {
        use MigrationStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Cancelled)
                | (Queued, InProgress)
                | (Queued, Cancelled)
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationStatus::Pending => "pending",
            MigrationStatus::Queued => "queued",
            MigrationStatus::InProgress => "in progress",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
            MigrationStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The tracked unit of work for migrating one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationTask {
    pub id: TaskId,
    pub object_name: String,
    pub object_type: ObjectType,
    pub status: MigrationStatus,
    /// 0-100, never decreases
    pub progress: u8,
    /// Unix milliseconds when the task went in progress
    pub started_at: Option<u64>,
    /// Wall time from start to terminal state, in milliseconds
    pub duration_ms: Option<u64>,
    pub detail: String,
    /// Set only when the task failed
    pub error: Option<String>,
    /// Migration script attempts made
    pub attempts: u32,
}

impl MigrationTask {
    pub fn new(object_type: ObjectType, object_name: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            object_name: object_name.into(),
            object_type,
            status: MigrationStatus::Pending,
            progress: 0,
            started_at: None,
            duration_ms: None,
            detail: "Pending".to_string(),
            error: None,
            attempts: 0,
        }
    }

    /// Attempts beyond the first
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_final() {
        use MigrationStatus::*;
        let all = [Pending, Queued, InProgress, Completed, Failed, Cancelled];
        for from in [Completed, Failed, Cancelled] {
            assert!(from.is_terminal());
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_forward_path() {
        use MigrationStatus::*;
        assert!(Pending.can_transition_to(Queued));
        assert!(Queued.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(InProgress));
        assert!(!Queued.can_transition_to(Completed));
    }

    #[test]
    fn test_new_task() {
        let task = MigrationTask::new(ObjectType::Vm, "web-01");
        assert_eq!(task.status, MigrationStatus::Pending);
        assert_eq!(task.progress, 0);
        assert_eq!(task.retries(), 0);
    }
}
