//! Output formatting utilities for the CLI
//!
//! Tables for backup subtasks, migration tasks, endpoint connections and
//! the script registry, plus colored status messages.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use vs_core::time::format_duration;
use vs_core::traits::ProgressSink;
use vs_core::types::{ConnectionResult, EndpointRole, TaskId};
use vs_core::{LogLevel, LogObservers};
use vs_orchestrator::backup::BackupTask;
use vs_orchestrator::{BackupSummary, MigrationReport, MigrationTask};

/// Format backup subtasks as a table
///
/// Artifact paths are shown relative to the backup directory.
pub fn format_backup_tasks(tasks: &[BackupTask], backup_path: &Path) -> String {
    if tasks.is_empty() {
        return "No backup items selected".to_string();
    }

    #[derive(Tabled)]
    struct BackupRow {
        #[tabled(rename = "ITEM")]
        kind: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "FILE")]
        file: String,
    }

    let rows: Vec<BackupRow> = tasks
        .iter()
        .map(|t| BackupRow {
            kind: t.kind.to_string(),
            status: t.detail.clone(),
            file: t
                .artifact
                .as_deref()
                .map(|p| p.strip_prefix(backup_path).unwrap_or(p).display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// One-line summary of a backup run
pub fn format_backup_summary(summary: &BackupSummary) -> String {
    format!(
        "{}/{} items ({}%) in {}",
        summary.completed,
        summary.total,
        summary.percentage(),
        format_duration(Duration::from_millis(
            summary.finished_at.saturating_sub(summary.started_at)
        ))
    )
}

/// Format migration tasks as a table
///
/// The detailed view adds task ids and the full error text.
pub fn format_migration_tasks(tasks: &[MigrationTask], detailed: bool) -> String {
    if tasks.is_empty() {
        return "No migration tasks".to_string();
    }

    #[derive(Tabled)]
    struct TaskRow {
        #[tabled(rename = "OBJECT")]
        object: String,
        #[tabled(rename = "TYPE")]
        object_type: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "PROGRESS")]
        progress: String,
        #[tabled(rename = "RETRIES")]
        retries: u32,
        #[tabled(rename = "DURATION")]
        duration: String,
    }

    #[derive(Tabled)]
    struct TaskRowDetailed {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "OBJECT")]
        object: String,
        #[tabled(rename = "TYPE")]
        object_type: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "PROGRESS")]
        progress: String,
        #[tabled(rename = "RETRIES")]
        retries: u32,
        #[tabled(rename = "DURATION")]
        duration: String,
        #[tabled(rename = "DETAIL")]
        detail: String,
    }

    let duration = |t: &MigrationTask| {
        t.duration_ms
            .map(|ms| format_duration(Duration::from_millis(ms)))
            .unwrap_or_else(|| "-".to_string())
    };

    if detailed {
        let rows: Vec<TaskRowDetailed> = tasks
            .iter()
            .map(|t| TaskRowDetailed {
                id: t.id.short(),
                object: t.object_name.clone(),
                object_type: t.object_type.to_string(),
                status: t.status.to_string(),
                progress: format!("{}%", t.progress),
                retries: t.retries(),
                duration: duration(t),
                detail: t.error.clone().unwrap_or_else(|| t.detail.clone()),
            })
            .collect();

        Table::new(rows)
            .with(Style::rounded())
            .with(Width::wrap(120))
            .to_string()
    } else {
        let rows: Vec<TaskRow> = tasks
            .iter()
            .map(|t| TaskRow {
                object: truncate(&t.object_name, 32),
                object_type: t.object_type.to_string(),
                status: t.status.to_string(),
                progress: format!("{}%", t.progress),
                retries: t.retries(),
                duration: duration(t),
            })
            .collect();

        Table::new(rows).with(Style::rounded()).to_string()
    }
}

/// One-line summary of a migration batch
pub fn format_migration_summary(report: &MigrationReport) -> String {
    let mut summary = format!(
        "{} completed, {} failed, {} cancelled",
        report.completed, report.failed, report.cancelled
    );
    if report.skipped > 0 {
        summary.push_str(&format!(", {} skipped", report.skipped));
    }
    format!("{} (peak concurrency {})", summary, report.peak_concurrency)
}

/// Format endpoint connection results as a table
pub fn format_connections(results: &[(EndpointRole, String, ConnectionResult)]) -> String {
    #[derive(Tabled)]
    struct ConnectionRow {
        #[tabled(rename = "ROLE")]
        role: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
        #[tabled(rename = "CONNECTED")]
        connected: String,
        #[tabled(rename = "VERSION / ERROR")]
        version: String,
    }

    let rows: Vec<ConnectionRow> = results
        .iter()
        .map(|(role, address, result)| ConnectionRow {
            role: role.to_string(),
            address: address.clone(),
            connected: if result.connected { "yes" } else { "no" }.to_string(),
            version: result
                .version
                .clone()
                .or_else(|| result.error.clone())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(100))
        .to_string()
}

/// Format the script registry as a table
pub fn format_scripts(scripts: &[(String, PathBuf)]) -> String {
    if scripts.is_empty() {
        return "No scripts registered".to_string();
    }

    #[derive(Tabled)]
    struct ScriptRow {
        #[tabled(rename = "SCRIPT")]
        name: String,
        #[tabled(rename = "PATH")]
        path: String,
        #[tabled(rename = "FOUND")]
        found: String,
    }

    let rows: Vec<ScriptRow> = scripts
        .iter()
        .map(|(name, path)| ScriptRow {
            name: name.clone(),
            path: path.display().to_string(),
            found: if path.is_file() { "yes" } else { "no" }.to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Mirror orchestrator log messages to the terminal.
///
/// With `quiet` only errors are shown.
pub fn attach_console(logs: &LogObservers, quiet: bool) {
    logs.subscribe(move |message, level| match level {
        LogLevel::Error => print_error(message),
        LogLevel::Warning if !quiet => print_warning(message),
        LogLevel::Info if !quiet => print_info(message),
        _ => {}
    });
}

/// Progress sink that prints overall backup progress and per-task milestones
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    quiet: bool,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_task_progress(&self, task_id: TaskId, percent: u8) {
        if !self.quiet {
            println!("  [{}] {:>3}%", task_id.short(), percent);
        }
    }

    fn on_overall_progress(&self, percent: u8) {
        if !self.quiet {
            println!("  {}", progress_bar(percent, 30));
        }
    }
}

/// Render `[#####-----]  50%`
pub fn progress_bar(percent: u8, width: usize) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent * width / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        percent
    )
}

/// Print a success message in green with a checkmark prefix
///
/// Outputs to stdout with green coloring for positive feedback to the user.
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr with red coloring for error feedback to the user.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
