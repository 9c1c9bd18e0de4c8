//! Backup orchestrator
//!
//! Runs the selected backup kinds one after another against the source
//! endpoint. Each attempted subtask leaves a file in the backup directory:
//! the script output on success, the error text on failure. Nothing written
//! is ever removed, so an aborted run still leaves a usable partial backup.
//!
//! Cancellation is only honoured between subtasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use vs_core::error::{ConnectionError, ScriptError};
use vs_core::scripts;
use vs_core::time::current_time_millis;
use vs_core::traits::ProgressSink;
use vs_core::types::{BackupKind, EndpointRole};
use vs_core::{LogObservers, VsError};

use super::task::{percentage, BackupOutcome, BackupSummary, BackupTask};
use crate::connection::EndpointConnectionManager;
use crate::script::ScriptSessionPool;

/// Manifest written at the end of a run
pub const MANIFEST_FILE: &str = "backup-manifest.json";

/// Errors that stop a backup run
#[derive(Error, Debug)]
pub enum BackupError {
    /// The backup directory could not be created; nothing ran
    #[error("Cannot create backup directory {}: {source}", path.display())]
    PathCreation {
        path: PathBuf,
        total: usize,
        #[source]
        source: std::io::Error,
    },

    /// The source endpoint is not connected; nothing ran
    #[error("Backup needs a connected source endpoint: {0}")]
    NotConnected(#[source] ConnectionError),

    /// A backup script has no registration; nothing ran
    #[error("Backup cannot start: {0}")]
    MissingScript(#[source] ScriptError),

    /// A subtask failed; later subtasks were skipped
    #[error("Backup of {kind} failed: {source}")]
    Subtask {
        kind: BackupKind,
        #[source]
        source: VsError,
        summary: Box<BackupSummary>,
    },
}

impl BackupError {
    /// Summary of the aborted run, when subtasks had started
    pub fn summary(&self) -> Option<&BackupSummary> {
        match self {
            BackupError::Subtask { summary, .. } => Some(summary),
            _ => None,
        }
    }

    /// Subtasks finished before the error
    pub fn completed(&self) -> usize {
        self.summary().map(|s| s.completed).unwrap_or(0)
    }
}

/// Runs backup pipelines against the source endpoint
pub struct BackupOrchestrator {
    pool: Arc<ScriptSessionPool>,
    connections: Arc<EndpointConnectionManager>,
    logs: Arc<LogObservers>,
}

impl BackupOrchestrator {
    pub fn new(
        pool: Arc<ScriptSessionPool>,
        connections: Arc<EndpointConnectionManager>,
        logs: Arc<LogObservers>,
    ) -> Self {
        Self {
            pool,
            connections,
            logs,
        }
    }

    /// Back up `kinds` into `backup_path`.
    ///
    /// Kinds run in the given order; duplicates are dropped. A cancelled run
    /// returns `Ok` with [`BackupOutcome::Cancelled`].
    pub async fn run(
        &self,
        backup_path: &Path,
        kinds: &[BackupKind],
        cancel: &CancellationToken,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<BackupSummary, BackupError> {
        let mut tasks: Vec<BackupTask> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !tasks.iter().any(|t| t.kind == *kind) {
                tasks.push(BackupTask::new(*kind));
            }
        }
        let total = tasks.len();

        let required: Vec<&str> = tasks.iter().map(|t| scripts::backup_script(t.kind)).collect();
        self.pool
            .ensure_registered(&required)
            .map_err(BackupError::MissingScript)?;
        self.connections
            .require(EndpointRole::Source)
            .map_err(BackupError::NotConnected)?;

        tokio::fs::create_dir_all(backup_path)
            .await
            .map_err(|source| {
                self.logs.error(format!(
                    "Cannot create backup directory {}: {} (0/{} subtasks run)",
                    backup_path.display(),
                    source,
                    total
                ));
                BackupError::PathCreation {
                    path: backup_path.to_path_buf(),
                    total,
                    source,
                }
            })?;

        self.logs.info(format!(
            "Starting backup of {} item(s) to {}",
            total,
            backup_path.display()
        ));

        let started_at = current_time_millis();
        let mut completed = 0usize;
        let mut outcome = BackupOutcome::Completed;
        let mut failure: Option<(BackupKind, VsError)> = None;

        for index in 0..total {
            if cancel.is_cancelled() {
                outcome = BackupOutcome::Cancelled;
                break;
            }

            let kind = tasks[index].kind;
            let endpoint = match self.connections.require(EndpointRole::Source) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    tasks[index].error = Some(e.to_string());
                    tasks[index].detail = "Source connection lost".to_string();
                    failure = Some((kind, e.into()));
                    break;
                }
            };

            let starting = format!("Backing up {} ({}/{})", kind.label(), index + 1, total);
            progress.on_detail(&starting);
            self.logs.info(&starting);
            tasks[index].detail = "Running".to_string();

            let params = endpoint
                .script_params()
                .with("OutputPath", backup_path.to_string_lossy().into_owned())
                .with("Kind", kind.as_str());

            match self
                .pool
                .execute(scripts::backup_script(kind), params, cancel)
                .await
            {
                Ok(output) => {
                    let artifact = backup_path.join(tasks[index].output_file());
                    if let Err(e) = tokio::fs::write(&artifact, output.as_bytes()).await {
                        tasks[index].error = Some(e.to_string());
                        tasks[index].detail = "Failed to write output".to_string();
                        failure = Some((kind, e.into()));
                        break;
                    }

                    completed += 1;
                    let task = &mut tasks[index];
                    task.completed = true;
                    task.artifact = Some(artifact);
                    task.detail = "Completed".to_string();

                    let percent = percentage(completed, total);
                    progress.on_overall_progress(percent);
                    progress.on_detail(&format!("Finished {} ({}%)", kind.label(), percent));
                }
                // Cancelled while waiting for a session: the script never started
                Err(e) if e.is_cancelled() => {
                    tasks[index].detail = "Cancelled".to_string();
                    outcome = BackupOutcome::Cancelled;
                    break;
                }
                Err(e) => {
                    let artifact = backup_path.join(tasks[index].error_file());
                    match tokio::fs::write(&artifact, e.to_string().as_bytes()).await {
                        Ok(()) => tasks[index].artifact = Some(artifact),
                        Err(write_err) => tracing::warn!(
                            "Could not record failure of {} in {}: {}",
                            kind,
                            artifact.display(),
                            write_err
                        ),
                    }
                    tasks[index].error = Some(e.to_string());
                    tasks[index].detail = "Failed".to_string();
                    failure = Some((kind, e.into()));
                    break;
                }
            }
        }

        if failure.is_some() {
            outcome = BackupOutcome::Failed;
        }
        if total == 0 {
            progress.on_overall_progress(100);
        }

        let summary = BackupSummary {
            path: backup_path.to_path_buf(),
            completed,
            total,
            outcome,
            started_at,
            finished_at: current_time_millis(),
            tasks,
        };
        self.write_manifest(&summary).await;

        match failure {
            Some((kind, source)) => {
                self.logs.error(format!(
                    "Backup aborted: {} failed after {}/{} subtasks: {}",
                    kind.label(),
                    completed,
                    total,
                    source
                ));
                Err(BackupError::Subtask {
                    kind,
                    source,
                    summary: Box::new(summary),
                })
            }
            None => {
                match outcome {
                    BackupOutcome::Cancelled => self.logs.info(format!(
                        "Backup cancelled after {}/{} subtasks",
                        completed, total
                    )),
                    _ => self.logs.info(format!(
                        "Backup completed: {}/{} subtasks written to {}",
                        completed,
                        total,
                        backup_path.display()
                    )),
                }
                Ok(summary)
            }
        }
    }

    async fn write_manifest(&self, summary: &BackupSummary) {
        let path = summary.path.join(MANIFEST_FILE);
        let result = match serde_json::to_vec_pretty(summary) {
            Ok(bytes) => tokio::fs::write(&path, bytes).await,
            Err(e) => Err(std::io::Error::other(e)),
        };
        if let Err(e) = result {
            self.logs.warn(format!(
                "Could not write backup manifest {}: {}",
                path.display(),
                e
            ));
        }
    }
}
