//! vmshift CLI
//!
//! Single binary for backup and migration between two virtualization
//! management endpoints:
//! - connectivity checks against source and destination
//! - configuration backup of the source endpoint
//! - bounded-concurrency migration of hosts, VMs and clusters

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vmshift::commands::{self, BackupOptions, MigrateOptions};
use vmshift::credentials::EnvCredentials;
use vmshift::output::attach_console;
use vs_core::config;
use vs_core::types::{BackupKind, ObjectType};
use vs_orchestrator::OrchestratorState;

#[derive(Parser)]
#[command(name = "vmshift")]
#[command(
    author,
    version,
    about = "Backup and migration orchestration between virtualization endpoints"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Skip the toolkit probe and run every script in simulation
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to endpoints and report their versions
    Connect {
        /// Source endpoint (profile name or user@address)
        #[arg(short, long)]
        source: Option<String>,
        /// Destination endpoint (profile name or user@address)
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Back up the source endpoint configuration
    Backup {
        /// Source endpoint (profile name or user@address)
        #[arg(short, long)]
        source: String,
        /// Backup directory (defaults to ./backup-<timestamp>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Items to back up, comma separated (defaults to the configured set)
        #[arg(short, long, value_delimiter = ',')]
        kinds: Vec<BackupKind>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Migrate objects from the source to the destination endpoint
    Migrate {
        /// Source endpoint (profile name or user@address)
        #[arg(short, long)]
        source: String,
        /// Destination endpoint (profile name or user@address)
        #[arg(short, long)]
        destination: String,
        /// Object type: host, vm or cluster
        #[arg(short = 't', long = "type", default_value = "vm")]
        object_type: ObjectType,
        /// Objects to migrate, in order
        objects: Vec<String>,
        /// Read more objects from a file, one per line
        #[arg(short = 'f', long)]
        objects_file: Option<PathBuf>,
        /// Maximum migrations in progress at once
        #[arg(short = 'j', long)]
        max_concurrent: Option<usize>,
        /// Retries after a transient failure
        #[arg(long)]
        retries: Option<u32>,
        /// Per-attempt timeout in minutes
        #[arg(long)]
        timeout: Option<u64>,
        /// Take a snapshot before migrating
        #[arg(long)]
        snapshot: bool,
        /// Skip post-migration validation
        #[arg(long)]
        no_validate: bool,
        /// Remove the source object after a successful migration
        #[arg(long)]
        remove_source: bool,
        /// Power on migrated objects
        #[arg(long)]
        power_on: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Show task ids, errors and progress milestones
        #[arg(short, long)]
        long: bool,
    },

    /// List registered scripts
    Scripts {
        /// Probe the toolkit and report the execution mode
        #[arg(short, long)]
        probe: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show config file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let command = match cli.command {
        Commands::Config { action } => {
            let path = cli.config.as_deref();
            match action {
                ConfigAction::Show => commands::config_show(path)?,
                ConfigAction::Path => commands::config_path(path),
                ConfigAction::Init { force } => commands::config_init(path, force)?,
            }
            return Ok(());
        }
        command => command,
    };

    let app_config = config::load_or_default(cli.config.as_deref()).with_context(|| {
        format!(
            "Failed to load config from {:?}",
            cli.config.clone().unwrap_or_else(config::default_config_path)
        )
    })?;

    let state = if cli.simulate {
        OrchestratorState::simulated(app_config)
    } else {
        OrchestratorState::new(app_config)
    };
    attach_console(&state.logs, cli.quiet);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let credentials = EnvCredentials;
    let result = match command {
        Commands::Connect {
            source,
            destination,
        } => {
            commands::connect_command(
                &state,
                source.as_deref(),
                destination.as_deref(),
                &credentials,
                &cancel,
            )
            .await
        }

        Commands::Backup {
            source,
            output,
            kinds,
            json,
        } => {
            let options = BackupOptions {
                source,
                output,
                kinds,
                json,
                quiet: cli.quiet,
            };
            commands::backup_command(&state, options, &credentials, &cancel).await
        }

        Commands::Migrate {
            source,
            destination,
            object_type,
            objects,
            objects_file,
            max_concurrent,
            retries,
            timeout,
            snapshot,
            no_validate,
            remove_source,
            power_on,
            json,
            long,
        } => {
            let options = MigrateOptions {
                source,
                destination,
                object_type,
                objects,
                objects_file,
                max_concurrent,
                retries,
                timeout_minutes: timeout,
                snapshot,
                no_validate,
                remove_source,
                power_on,
                json,
                detailed: long,
                quiet: cli.quiet,
            };
            commands::migrate_command(&state, options, &credentials, &cancel).await
        }

        Commands::Scripts { probe } => commands::scripts_command(&state, probe).await,

        Commands::Config { .. } => Ok(()),
    };

    state.shutdown().await;
    result
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, cancelling...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, cancelling...");
            }
        }

        cancel.cancel();
    });
}
