//! Migrate command implementation

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use vs_core::config::MigrationSettings;
use vs_core::traits::CredentialProvider;
use vs_core::types::{EndpointRole, ObjectType};
use vs_orchestrator::{MigrationReport, OrchestratorState};

use super::{connect_profile, resolve_endpoint};
use crate::output::{
    format_migration_summary, format_migration_tasks, print_info, print_success, print_warning,
    ConsoleProgress,
};

/// Arguments of `vmshift migrate`
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub source: String,
    pub destination: String,
    pub object_type: ObjectType,
    /// Object identifiers given on the command line
    pub objects: Vec<String>,
    /// File with one object identifier per line
    pub objects_file: Option<PathBuf>,
    pub max_concurrent: Option<usize>,
    pub retries: Option<u32>,
    pub timeout_minutes: Option<u64>,
    pub snapshot: bool,
    pub no_validate: bool,
    pub remove_source: bool,
    pub power_on: bool,
    pub json: bool,
    pub detailed: bool,
    pub quiet: bool,
}

impl MigrateOptions {
    /// Configured policy with command-line overrides applied
    pub fn settings(&self, base: &MigrationSettings) -> MigrationSettings {
        let mut settings = base.clone();
        if let Some(n) = self.max_concurrent {
            settings.max_concurrent_migrations = n;
        }
        if let Some(n) = self.retries {
            settings.retry_attempts = n;
        }
        if let Some(mins) = self.timeout_minutes {
            settings.task_timeout = Duration::from_secs(mins.saturating_mul(60));
        }
        if self.snapshot {
            settings.create_snapshot = true;
        }
        if self.no_validate {
            settings.validate_after_migration = false;
        }
        if self.remove_source {
            settings.remove_source_after_migration = true;
        }
        if self.power_on {
            settings.power_on_after_migration = true;
        }
        settings
    }

    /// Objects from the command line followed by those from the file.
    /// Blank lines and `#` comments in the file are skipped.
    pub fn object_ids(&self) -> Result<Vec<String>> {
        let mut ids = self.objects.clone();
        if let Some(path) = &self.objects_file {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read object list: {:?}", path))?;
            ids.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string),
            );
        }
        Ok(ids)
    }
}

/// Connect both endpoints and run a migration batch
pub async fn migrate_command(
    state: &OrchestratorState,
    options: MigrateOptions,
    credentials: &dyn CredentialProvider,
    cancel: &CancellationToken,
) -> Result<()> {
    let ids = options.object_ids()?;
    if ids.is_empty() {
        bail!("No objects to migrate");
    }
    let settings = options.settings(&state.config.migration);
    settings.validate().context("Invalid migration settings")?;

    let mode = state.initialize().await;
    if !options.quiet {
        print_info(&format!("Execution mode: {}", mode));
    }

    let source = resolve_endpoint(&state.config, &options.source)?;
    let destination = resolve_endpoint(&state.config, &options.destination)?;
    // Both attempts run to completion so neither slot is left mid-connect
    let (src, dst) = tokio::join!(
        connect_profile(state, EndpointRole::Source, &source, credentials, cancel),
        connect_profile(
            state,
            EndpointRole::Destination,
            &destination,
            credentials,
            cancel
        ),
    );
    src?;
    dst?;

    let orchestrator = state.migration();
    let tasks = orchestrator.prepare(options.object_type, ids);
    let progress = Arc::new(ConsoleProgress::new(
        options.quiet || options.json || !options.detailed,
    ));
    let report = orchestrator
        .run(tasks, &settings, cancel, progress)
        .await
        .context("Migration did not start")?;

    print_report(&report, &options)?;

    if report.failed > 0 {
        bail!(
            "{} of {} migration task(s) failed",
            report.failed,
            report.tasks.len()
        );
    }
    if report.cancelled > 0 {
        print_warning(&format!(
            "Migration cancelled: {}",
            format_migration_summary(&report)
        ));
    } else if !options.quiet {
        print_success(&format!(
            "Migration finished: {}",
            format_migration_summary(&report)
        ));
    }
    Ok(())
}

fn print_report(report: &MigrationReport, options: &MigrateOptions) -> Result<()> {
    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize migration report")?
        );
    } else {
        println!("{}", format_migration_tasks(&report.tasks, options.detailed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn options() -> MigrateOptions {
        MigrateOptions {
            source: "src".to_string(),
            destination: "dst".to_string(),
            object_type: ObjectType::Vm,
            objects: vec!["web-01".to_string()],
            objects_file: None,
            max_concurrent: None,
            retries: None,
            timeout_minutes: None,
            snapshot: false,
            no_validate: false,
            remove_source: false,
            power_on: false,
            json: false,
            detailed: false,
            quiet: false,
        }
    }

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let mut opts = options();
        opts.max_concurrent = Some(5);
        opts.retries = Some(0);
        opts.timeout_minutes = Some(10);
        opts.no_validate = true;
        opts.snapshot = true;

        let settings = opts.settings(&MigrationSettings::default());
        assert_eq!(settings.max_concurrent_migrations, 5);
        assert_eq!(settings.retry_attempts, 0);
        assert_eq!(settings.task_timeout, Duration::from_secs(600));
        assert!(!settings.validate_after_migration);
        assert!(settings.create_snapshot);
        assert!(!settings.remove_source_after_migration);
    }

    #[test]
    fn test_object_ids_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# batch 1\ndb-01\n\n  app-01  ").unwrap();

        let mut opts = options();
        opts.objects_file = Some(file.path().to_path_buf());
        assert_eq!(opts.object_ids().unwrap(), vec!["web-01", "db-01", "app-01"]);
    }
}
