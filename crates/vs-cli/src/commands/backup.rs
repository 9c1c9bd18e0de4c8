//! Backup command implementation

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use vs_core::time::current_time_millis;
use vs_core::traits::CredentialProvider;
use vs_core::types::{BackupKind, EndpointRole};
use vs_orchestrator::{BackupError, BackupOutcome, BackupSummary, OrchestratorState};

use super::{connect_profile, resolve_endpoint};
use crate::output::{
    format_backup_summary, format_backup_tasks, print_info, print_success, print_warning,
    ConsoleProgress,
};

/// Arguments of `vmshift backup`
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Profile name or `user@address` of the source endpoint
    pub source: String,
    /// Backup directory; defaults to `./backup-<millis>`
    pub output: Option<PathBuf>,
    /// Kinds to run; empty means the configured defaults
    pub kinds: Vec<BackupKind>,
    /// Print the summary as JSON instead of a table
    pub json: bool,
    pub quiet: bool,
}

/// Connect the source endpoint and run the backup pipeline
pub async fn backup_command(
    state: &OrchestratorState,
    options: BackupOptions,
    credentials: &dyn CredentialProvider,
    cancel: &CancellationToken,
) -> Result<()> {
    let mode = state.initialize().await;
    if !options.quiet {
        print_info(&format!("Execution mode: {}", mode));
    }

    let profile = resolve_endpoint(&state.config, &options.source)?;
    connect_profile(state, EndpointRole::Source, &profile, credentials, cancel).await?;

    let kinds = if options.kinds.is_empty() {
        state.config.backup.default_kinds.clone()
    } else {
        options.kinds
    };
    let backup_path = options
        .output
        .unwrap_or_else(|| PathBuf::from(format!("backup-{}", current_time_millis())));

    let progress = Arc::new(ConsoleProgress::new(options.quiet || options.json));
    match state
        .backup()
        .run(&backup_path, &kinds, cancel, progress)
        .await
    {
        Ok(summary) => {
            report(&summary, options.json)?;
            match summary.outcome {
                BackupOutcome::Cancelled => {
                    print_warning(&format!(
                        "Backup cancelled: {}",
                        format_backup_summary(&summary)
                    ));
                }
                _ => {
                    if !options.quiet {
                        print_success(&format!(
                            "Backup written to {}: {}",
                            summary.path.display(),
                            format_backup_summary(&summary)
                        ));
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            if let Some(summary) = e.summary() {
                report(summary, options.json)?;
            }
            let context = match &e {
                BackupError::Subtask { .. } => format!(
                    "Backup aborted after {} item(s); partial output kept in {}",
                    e.completed(),
                    backup_path.display()
                ),
                _ => "Backup did not start".to_string(),
            };
            Err(e).context(context)
        }
    }
}

fn report(summary: &BackupSummary, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).context("Failed to serialize backup summary")?
        );
    } else {
        println!("{}", format_backup_tasks(&summary.tasks, &summary.path));
    }
    Ok(())
}
