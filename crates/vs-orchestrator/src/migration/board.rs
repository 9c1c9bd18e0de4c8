//! Authoritative migration task state
//!
//! Workers update tasks by id; observers read ordered snapshots. Updates
//! take the write side of `gate` so a snapshot never sees the in-progress
//! counter disagree with the task statuses it returns.
//!
//! The board enforces two rules on every update:
//! - status changes must follow [`MigrationStatus::can_transition_to`];
//!   an update carrying an illegal one is dropped whole, with a warning,
//! - progress never decreases.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;

use vs_core::types::TaskId;

use super::task::{MigrationStatus, MigrationTask};

pub struct TaskBoard {
    gate: RwLock<()>,
    tasks: DashMap<TaskId, MigrationTask>,
    /// Input order
    order: Vec<TaskId>,
    in_progress: AtomicUsize,
    peak: AtomicUsize,
}

impl TaskBoard {
    pub fn new(tasks: Vec<MigrationTask>) -> Self {
        let order = tasks.iter().map(|t| t.id).collect();
        let in_progress = tasks
            .iter()
            .filter(|t| t.status == MigrationStatus::InProgress)
            .count();
        Self {
            gate: RwLock::new(()),
            tasks: tasks.into_iter().map(|t| (t.id, t)).collect(),
            order,
            in_progress: AtomicUsize::new(in_progress),
            peak: AtomicUsize::new(in_progress),
        }
    }

    /// Task ids in input order
    pub fn ids(&self) -> &[TaskId] {
        &self.order
    }

    /// Apply `f` to one task and return the resulting copy.
    ///
    /// If `f` makes an illegal status change nothing it did is kept and the
    /// unchanged task is returned.
    pub fn update<F>(&self, id: &TaskId, f: F) -> Option<MigrationTask>
    where
        F: FnOnce(&mut MigrationTask),
    {
        let _gate = self.gate.write();
        let mut task = self.tasks.get_mut(id)?;
        let before = task.value().clone();
        let before_status = before.status;

        f(&mut *task);

        if task.status != before_status && !before_status.can_transition_to(task.status) {
            tracing::warn!(
                "Ignoring illegal transition {} -> {} for {}",
                before_status,
                task.status,
                task.object_name
            );
            *task = before;
            return Some(task.value().clone());
        }
        task.progress = task.progress.clamp(before.progress, 100);

        let was_running = before_status == MigrationStatus::InProgress;
        let is_running = task.status == MigrationStatus::InProgress;
        if !was_running && is_running {
            let now = self.in_progress.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        } else if was_running && !is_running {
            self.in_progress.fetch_sub(1, Ordering::SeqCst);
        }

        Some(task.value().clone())
    }

    pub fn get(&self, id: &TaskId) -> Option<MigrationTask> {
        let _gate = self.gate.read();
        self.tasks.get(id).map(|t| t.value().clone())
    }

    /// Consistent copy of every task in input order
    pub fn snapshot(&self) -> Vec<MigrationTask> {
        let _gate = self.gate.read();
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id).map(|t| t.value().clone()))
            .collect()
    }

    /// Tasks currently in progress
    pub fn in_progress(&self) -> usize {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Highest in-progress count seen so far
    pub fn peak_in_progress(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of tasks with the given status
    pub fn count(&self, status: MigrationStatus) -> usize {
        let _gate = self.gate.read();
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vs_core::types::ObjectType;

    fn board(names: &[&str]) -> TaskBoard {
        TaskBoard::new(
            names
                .iter()
                .map(|n| MigrationTask::new(ObjectType::Vm, *n))
                .collect(),
        )
    }

    #[test]
    fn test_snapshot_keeps_input_order() {
        let board = board(&["c", "a", "b"]);
        let names: Vec<_> = board
            .snapshot()
            .into_iter()
            .map(|t| t.object_name)
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let board = board(&["a"]);
        let id = board.ids()[0];
        board.update(&id, |t| t.progress = 40);
        let task = board.update(&id, |t| t.progress = 10).unwrap();
        assert_eq!(task.progress, 40);
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let board = board(&["a"]);
        let id = board.ids()[0];
        let task = board
            .update(&id, |t| t.status = MigrationStatus::Completed)
            .unwrap();
        assert_eq!(task.status, MigrationStatus::Pending);
    }

    #[test]
    fn test_illegal_transition_discards_whole_update() {
        let board = board(&["a"]);
        let id = board.ids()[0];
        board.update(&id, |t| t.status = MigrationStatus::Queued);
        board.update(&id, |t| t.status = MigrationStatus::InProgress);
        board.update(&id, |t| {
            t.status = MigrationStatus::Completed;
            t.progress = 100;
        });

        let task = board
            .update(&id, |t| {
                t.status = MigrationStatus::Failed;
                t.error = Some("boom".to_string());
                t.detail = "Failed".to_string();
            })
            .unwrap();
        assert_eq!(task.status, MigrationStatus::Completed);
        assert_eq!(task.error, None);
        assert_eq!(board.get(&id).unwrap().detail, task.detail);
        assert_ne!(task.detail, "Failed");
    }

    #[test]
    fn test_in_progress_counter_and_peak() {
        let board = board(&["a", "b"]);
        let (a, b) = (board.ids()[0], board.ids()[1]);
        for id in [a, b] {
            board.update(&id, |t| t.status = MigrationStatus::Queued);
            board.update(&id, |t| t.status = MigrationStatus::InProgress);
        }
        assert_eq!(board.in_progress(), 2);

        // A retry stays in progress and does not double count
        board.update(&a, |t| t.attempts += 1);
        assert_eq!(board.in_progress(), 2);

        board.update(&a, |t| t.status = MigrationStatus::Completed);
        board.update(&b, |t| t.status = MigrationStatus::Failed);
        assert_eq!(board.in_progress(), 0);
        assert_eq!(board.peak_in_progress(), 2);
        assert_eq!(board.count(MigrationStatus::Completed), 1);
    }
}
