//! Migration orchestrator
//!
//! Every task gets its own worker. Workers wait for one of
//! `max_concurrent_migrations` slots before going in progress, so queued
//! tasks cost nothing but a parked future. Per task:
//!
//! 1. optional snapshot,
//! 2. migration script, retried on transient failures,
//! 3. optional validation,
//! 4. optional source removal (never changes the outcome).
//!
//! Cancellation is checked before each of those steps and during the retry
//! delay. A task still waiting for a slot is cancelled at once.
//!
//! Only Pending tasks are admitted. Anything else handed to `run` (a task
//! from an earlier report, say) is left untouched and counted as skipped.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use vs_core::config::MigrationSettings;
use vs_core::error::{ConfigError, ConnectionError, ScriptError};
use vs_core::scripts;
use vs_core::time::{current_time_millis, elapsed_since, format_duration};
use vs_core::traits::ProgressSink;
use vs_core::types::{EndpointRole, ObjectType, ScriptParams, TaskId};
use vs_core::LogObservers;

use super::board::TaskBoard;
use super::classify::FailureClass;
use super::task::{MigrationStatus, MigrationTask};
use crate::connection::EndpointConnectionManager;
use crate::script::ScriptSessionPool;

const PROGRESS_STARTED: u8 = 5;
const PROGRESS_SNAPSHOT: u8 = 20;
const PROGRESS_MIGRATED: u8 = 80;
const PROGRESS_VALIDATED: u8 = 95;

/// Errors that prevent a migration batch from starting.
///
/// Per-task failures never show up here; they are recorded on the task.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Invalid migration settings: {0}")]
    Settings(#[from] ConfigError),

    #[error("Migration needs both endpoints connected: {0}")]
    NotConnected(#[from] ConnectionError),

    #[error("Migration cannot start: {0}")]
    MissingScript(#[from] ScriptError),
}

/// Aggregate result of a batch
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Every task in input order
    pub tasks: Vec<MigrationTask>,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Tasks that were not Pending when the batch started and did not run
    pub skipped: usize,
    /// Highest number of tasks in progress at once
    pub peak_concurrency: usize,
}

impl MigrationReport {
    fn new(tasks: Vec<MigrationTask>, skipped: usize, peak_concurrency: usize) -> Self {
        let count = |status| tasks.iter().filter(|t| t.status == status).count();
        Self {
            completed: count(MigrationStatus::Completed),
            failed: count(MigrationStatus::Failed),
            cancelled: count(MigrationStatus::Cancelled),
            skipped,
            peak_concurrency,
            tasks,
        }
    }

    /// True when every task completed
    pub fn is_success(&self) -> bool {
        self.completed == self.tasks.len()
    }

    pub fn task(&self, object_name: &str) -> Option<&MigrationTask> {
        self.tasks.iter().find(|t| t.object_name == object_name)
    }
}

/// Schedules migration tasks between the source and destination endpoints
pub struct MigrationOrchestrator {
    pool: Arc<ScriptSessionPool>,
    connections: Arc<EndpointConnectionManager>,
    logs: Arc<LogObservers>,
    board: parking_lot::Mutex<Option<Arc<TaskBoard>>>,
}

impl MigrationOrchestrator {
    pub fn new(
        pool: Arc<ScriptSessionPool>,
        connections: Arc<EndpointConnectionManager>,
        logs: Arc<LogObservers>,
    ) -> Self {
        Self {
            pool,
            connections,
            logs,
            board: parking_lot::Mutex::new(None),
        }
    }

    /// One pending task per object, in the order given
    pub fn prepare<I, S>(&self, object_type: ObjectType, object_ids: I) -> Vec<MigrationTask>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tasks: Vec<MigrationTask> = object_ids
            .into_iter()
            .map(|id| MigrationTask::new(object_type, id))
            .collect();
        self.logs.info(format!(
            "Prepared {} {} migration task(s)",
            tasks.len(),
            object_type
        ));
        tasks
    }

    /// Snapshot of the batch currently running (or last run)
    pub fn snapshot(&self) -> Vec<MigrationTask> {
        self.board
            .lock()
            .as_ref()
            .map(|b| b.snapshot())
            .unwrap_or_default()
    }

    /// Run a batch to completion.
    ///
    /// Returns `Err` only when the batch cannot start. Once tasks are
    /// admitted the result is always a report, whatever the tasks did.
    pub async fn run(
        &self,
        tasks: Vec<MigrationTask>,
        settings: &MigrationSettings,
        cancel: &CancellationToken,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<MigrationReport, MigrationError> {
        settings.validate()?;
        if settings.exceeds_recommended_concurrency() {
            self.logs.warn(format!(
                "max_concurrent_migrations = {} is above the recommended maximum of {}",
                settings.max_concurrent_migrations,
                vs_core::config::RECOMMENDED_MAX_CONCURRENCY
            ));
        }
        if self.pool.capacity() < settings.max_concurrent_migrations {
            self.logs.warn(format!(
                "Script pool capacity {} is below max_concurrent_migrations {}; tasks will also queue for sessions",
                self.pool.capacity(),
                settings.max_concurrent_migrations
            ));
        }

        self.connections.require(EndpointRole::Source)?;
        self.connections.require(EndpointRole::Destination)?;
        let (pending, skipped) = {
            let (pending, finished): (Vec<&MigrationTask>, Vec<&MigrationTask>) = tasks
                .iter()
                .partition(|t| t.status == MigrationStatus::Pending);
            self.pool
                .ensure_registered(&required_scripts(&pending, settings))?;
            for task in &finished {
                self.logs.warn(format!(
                    "Skipping {} {}: already {}",
                    task.object_type, task.object_name, task.status
                ));
            }
            let ids: Vec<TaskId> = pending.iter().map(|t| t.id).collect();
            (ids, finished.len())
        };

        let board = Arc::new(TaskBoard::new(tasks));
        *self.board.lock() = Some(Arc::clone(&board));

        let mut admitted = Vec::with_capacity(pending.len());
        for id in pending {
            let queued = board.update(&id, |t| {
                t.status = MigrationStatus::Queued;
                t.detail = "Queued".to_string();
            });
            if queued.is_some_and(|t| t.status == MigrationStatus::Queued) {
                admitted.push(id);
            }
        }

        self.logs.info(format!(
            "Starting migration of {} object(s), up to {} at a time",
            admitted.len(),
            settings.max_concurrent_migrations
        ));

        let worker = Arc::new(Worker {
            pool: Arc::clone(&self.pool),
            connections: Arc::clone(&self.connections),
            logs: Arc::clone(&self.logs),
            settings: settings.clone(),
            cancel: cancel.clone(),
            progress,
            board: Arc::clone(&board),
        });
        let slots = Arc::new(Semaphore::new(settings.max_concurrent_migrations));
        let mut workers = JoinSet::new();

        for id in admitted {
            let worker = Arc::clone(&worker);
            let slots = Arc::clone(&slots);
            workers.spawn(async move {
                let _slot = tokio::select! {
                    biased;
                    _ = worker.cancel.cancelled() => {
                        worker.cancel_waiting(&id);
                        return;
                    }
                    slot = slots.acquire_owned() => match slot {
                        Ok(slot) => slot,
                        Err(_) => return,
                    },
                };
                worker.run_task(&id).await;
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                self.logs.error(format!("Migration worker aborted: {}", e));
            }
        }

        let report = MigrationReport::new(board.snapshot(), skipped, board.peak_in_progress());
        self.logs.info(format!(
            "Migration finished: {} completed, {} failed, {} cancelled, {} skipped",
            report.completed, report.failed, report.cancelled, report.skipped
        ));
        Ok(report)
    }
}

/// Scripts a batch may call
fn required_scripts(tasks: &[&MigrationTask], settings: &MigrationSettings) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Vec::new();
    for task in tasks {
        let script = scripts::migration_script(task.object_type);
        if !names.contains(&script) {
            names.push(script);
        }
    }
    if settings.create_snapshot {
        names.push(scripts::CREATE_SNAPSHOT);
    }
    if settings.validate_after_migration {
        names.push(scripts::VALIDATE_MIGRATION);
    }
    if settings.remove_source_after_migration {
        names.push(scripts::REMOVE_SOURCE);
    }
    names
}

enum Outcome {
    Completed,
    Failed(String),
    Cancelled(&'static str),
}

/// State shared by every worker of one batch
struct Worker {
    pool: Arc<ScriptSessionPool>,
    connections: Arc<EndpointConnectionManager>,
    logs: Arc<LogObservers>,
    settings: MigrationSettings,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressSink>,
    board: Arc<TaskBoard>,
}

impl Worker {
    fn cancel_waiting(&self, id: &TaskId) {
        let cancelled = self.board.update(id, |t| {
            t.status = MigrationStatus::Cancelled;
            t.detail = "Cancelled before start".to_string();
        });
        if let Some(task) = cancelled.filter(|t| t.status == MigrationStatus::Cancelled) {
            self.logs.info(format!(
                "Cancelled queued migration of {} {}",
                task.object_type, task.object_name
            ));
        }
    }

    async fn run_task(&self, id: &TaskId) {
        if self.cancel.is_cancelled() {
            self.cancel_waiting(id);
            return;
        }

        let started = current_time_millis();
        let Some(task) = self.board.update(id, |t| {
            t.status = MigrationStatus::InProgress;
            t.started_at = Some(started);
            t.progress = PROGRESS_STARTED;
            t.detail = "Starting".to_string();
        }) else {
            return;
        };
        if task.status != MigrationStatus::InProgress {
            return;
        }
        self.progress.on_task_progress(*id, task.progress);
        self.progress.on_detail(&format!("Migrating {}", task.object_name));
        self.logs.info(format!(
            "Migrating {} {}",
            task.object_type, task.object_name
        ));

        let outcome = self.execute(&task).await;
        self.finish(id, started, outcome);
    }

    async fn execute(&self, task: &MigrationTask) -> Outcome {
        let settings = &self.settings;

        if settings.create_snapshot {
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled("before snapshot");
            }
            self.advance(&task.id, None, format!("Creating snapshot '{}'", settings.snapshot_name));
            let params = match self.params(task) {
                Ok(p) => p.with("SnapshotName", settings.snapshot_name.as_str()),
                Err(e) => return Outcome::Failed(format!("{}: {}", task.object_name, e)),
            };
            match self.call(scripts::CREATE_SNAPSHOT, params).await {
                Ok(_) => self.advance(&task.id, Some(PROGRESS_SNAPSHOT), "Snapshot created".to_string()),
                Err(e) if e.is_cancelled() => return Outcome::Cancelled("before snapshot"),
                Err(e) => {
                    return Outcome::Failed(format!(
                        "Snapshot of {} failed: {}",
                        task.object_name, e
                    ))
                }
            }
        }

        let script = scripts::migration_script(task.object_type);
        let max_attempts = settings.retry_attempts.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled("before migration attempt");
            }

            let detail = if attempt == 1 {
                "Migrating".to_string()
            } else {
                format!("Migrating (attempt {}/{})", attempt, max_attempts)
            };
            self.board.update(&task.id, |t| {
                t.attempts = attempt;
                t.detail = detail;
            });

            let params = match self.params(task) {
                Ok(p) => p
                    .with("PreserveNetwork", settings.preserve_network_settings)
                    .with("PowerOn", settings.power_on_after_migration),
                Err(e) => return Outcome::Failed(format!("{}: {}", task.object_name, e)),
            };

            match self.call(script, params).await {
                Ok(_) => {
                    self.advance(&task.id, Some(PROGRESS_MIGRATED), "Migrated".to_string());
                    break;
                }
                Err(e) if e.is_cancelled() => return Outcome::Cancelled("before migration attempt"),
                Err(e) => {
                    let class = FailureClass::classify(&e, &settings.transient_signatures);
                    if class.is_transient() && attempt < max_attempts {
                        self.logs.warn(format!(
                            "Transient failure migrating {} (attempt {}/{}): {}; retrying in {}",
                            task.object_name,
                            attempt,
                            max_attempts,
                            e,
                            format_duration(settings.retry_delay)
                        ));
                        self.advance(&task.id, None, "Waiting to retry".to_string());
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return Outcome::Cancelled("during retry delay"),
                            _ = tokio::time::sleep(settings.retry_delay) => {}
                        }
                        continue;
                    }
                    return Outcome::Failed(if class.is_transient() {
                        format!(
                            "Migration of {} failed after {} attempt(s): {}",
                            task.object_name, attempt, e
                        )
                    } else {
                        format!("Migration of {} failed: {}", task.object_name, e)
                    });
                }
            }
        }

        if settings.validate_after_migration {
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled("before validation");
            }
            self.advance(&task.id, None, "Validating".to_string());
            let params = match self.params(task) {
                Ok(p) => p,
                Err(e) => return Outcome::Failed(format!("{}: {}", task.object_name, e)),
            };
            match self.call(scripts::VALIDATE_MIGRATION, params).await {
                Ok(_) => self.advance(&task.id, Some(PROGRESS_VALIDATED), "Validated".to_string()),
                Err(e) if e.is_cancelled() => return Outcome::Cancelled("before validation"),
                Err(e) => {
                    return Outcome::Failed(format!(
                        "Validation of {} failed: {}",
                        task.object_name, e
                    ))
                }
            }
        }

        if settings.remove_source_after_migration {
            self.remove_source(task).await;
        }

        Outcome::Completed
    }

    /// Best effort: the task is complete whatever happens here
    async fn remove_source(&self, task: &MigrationTask) {
        if self.cancel.is_cancelled() {
            self.logs.warn(format!(
                "Skipping source removal for {}: run cancelled",
                task.object_name
            ));
            return;
        }
        self.advance(&task.id, None, "Removing source".to_string());
        let result = match self.params(task) {
            Ok(params) => self.call(scripts::REMOVE_SOURCE, params).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match result {
            Ok(_) => self
                .logs
                .info(format!("Removed {} from the source endpoint", task.object_name)),
            Err(e) => self.logs.warn(format!(
                "Source removal for {} failed, migration stays completed: {}",
                task.object_name, e
            )),
        }
    }

    fn finish(&self, id: &TaskId, started: u64, outcome: Outcome) {
        let duration = elapsed_since(started);
        let Some(task) = self.board.update(id, |t| {
            t.duration_ms = Some(duration.as_millis() as u64);
            match &outcome {
                Outcome::Completed => {
                    t.status = MigrationStatus::Completed;
                    t.progress = 100;
                    t.detail = "Completed".to_string();
                }
                Outcome::Failed(message) => {
                    t.status = MigrationStatus::Failed;
                    t.error = Some(message.clone());
                    t.detail = "Failed".to_string();
                }
                Outcome::Cancelled(checkpoint) => {
                    t.status = MigrationStatus::Cancelled;
                    t.detail = format!("Cancelled {}", checkpoint);
                }
            }
        }) else {
            return;
        };

        self.progress.on_task_progress(*id, task.progress);
        match outcome {
            Outcome::Completed => self.logs.info(format!(
                "Migrated {} {} in {}",
                task.object_type,
                task.object_name,
                format_duration(duration)
            )),
            Outcome::Failed(message) => self.logs.error(message),
            Outcome::Cancelled(checkpoint) => self.logs.info(format!(
                "Migration of {} cancelled {}",
                task.object_name, checkpoint
            )),
        }
    }

    fn advance(&self, id: &TaskId, percent: Option<u8>, detail: String) {
        let before = self.board.get(id).map(|t| t.progress);
        if let Some(task) = self.board.update(id, |t| {
            if let Some(p) = percent {
                t.progress = p;
            }
            t.detail = detail;
        }) {
            if before != Some(task.progress) {
                self.progress.on_task_progress(*id, task.progress);
            }
        }
    }

    async fn call(&self, script: &str, params: ScriptParams) -> Result<String, ScriptError> {
        self.pool
            .execute_with_timeout(script, params, self.settings.task_timeout, &self.cancel)
            .await
    }

    /// Object identity plus both endpoints, looked up fresh for every call
    fn params(&self, task: &MigrationTask) -> Result<ScriptParams, ConnectionError> {
        let source = self.connections.require(EndpointRole::Source)?;
        let destination = self.connections.require(EndpointRole::Destination)?;

        let mut params = ScriptParams::new()
            .with("ObjectName", task.object_name.as_str())
            .with("ObjectType", task.object_type.to_string());
        for (prefix, endpoint) in [("Source", source), ("Destination", destination)] {
            for (key, value) in endpoint.script_params().entries() {
                params.insert(format!("{}{}", prefix, key), value.clone());
            }
        }
        Ok(params)
    }
}
