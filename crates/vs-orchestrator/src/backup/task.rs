//! Backup task model

use serde::Serialize;
use std::path::PathBuf;

use vs_core::types::BackupKind;

/// One subtask of a backup run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupTask {
    pub kind: BackupKind,
    pub completed: bool,
    /// Free-text progress detail
    pub detail: String,
    /// Error text if the subtask failed
    pub error: Option<String>,
    /// File written for this subtask, if it was attempted
    pub artifact: Option<PathBuf>,
}

impl BackupTask {
    pub fn new(kind: BackupKind) -> Self {
        Self {
            kind,
            completed: false,
            detail: "Pending".to_string(),
            error: None,
            artifact: None,
        }
    }

    /// Artifact name for successful output
    pub fn output_file(&self) -> String {
        format!("{}.txt", self.kind.as_str())
    }

    /// Artifact name for a failed attempt
    pub fn error_file(&self) -> String {
        format!("{}.error.txt", self.kind.as_str())
    }
}

/// How a backup run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupOutcome {
    /// Every selected subtask finished
    Completed,
    /// Stopped between subtasks on request
    Cancelled,
    /// A subtask failed and the rest were skipped
    Failed,
}

/// Result of a backup run, also written as the manifest
#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    pub path: PathBuf,
    pub completed: usize,
    pub total: usize,
    pub outcome: BackupOutcome,
    pub started_at: u64,
    pub finished_at: u64,
    pub tasks: Vec<BackupTask>,
}

impl BackupSummary {
    /// Completion percentage, 100 for an empty selection
    pub fn percentage(&self) -> u8 {
        percentage(self.completed, self.total)
    }
}

pub(crate) fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (completed.min(total) * 100 / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_rounds_down_and_caps() {
        assert_eq!(percentage(0, 3), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 66);
        assert_eq!(percentage(3, 3), 100);
        assert_eq!(percentage(0, 0), 100);
    }

    #[test]
    fn test_percentage_strictly_increases() {
        for total in 1..=9 {
            let values: Vec<u8> = (0..=total).map(|c| percentage(c, total)).collect();
            assert!(values.windows(2).all(|w| w[0] < w[1]), "total={}", total);
            assert_eq!(*values.last().unwrap(), 100);
        }
    }

    #[test]
    fn test_artifact_names() {
        let task = BackupTask::new(BackupKind::UsersGroups);
        assert_eq!(task.output_file(), "users-groups.txt");
        assert_eq!(task.error_file(), "users-groups.error.txt");
    }
}
