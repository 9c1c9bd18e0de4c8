//! Migration policy settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_mins;
use crate::error::ConfigError;

/// Concurrency above this works but tends to overload the endpoints
pub const RECOMMENDED_MAX_CONCURRENCY: usize = 10;

/// Error substrings that mark a failure as worth retrying
pub const DEFAULT_TRANSIENT_SIGNATURES: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection was closed",
    "temporarily unavailable",
    "service unavailable",
    "could not connect",
    "network is unreachable",
    "resource is busy",
    "another task is already in progress",
];

/// Policy applied to a batch of migration tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Upper bound on tasks in progress at once
    pub max_concurrent_migrations: usize,

    /// Per-attempt timeout for the migration script
    #[serde(rename = "timeout_minutes", with = "duration_mins")]
    pub task_timeout: Duration,

    /// Extra attempts after a transient failure
    pub retry_attempts: u32,

    /// Wait between attempts
    #[serde(rename = "retry_delay_minutes", with = "duration_mins")]
    pub retry_delay: Duration,

    /// Take a snapshot before migrating
    pub create_snapshot: bool,

    /// Name given to the pre-migration snapshot
    pub snapshot_name: String,

    /// Run the validation script after a successful transfer
    pub validate_after_migration: bool,

    /// Remove the source object once the task completed
    pub remove_source_after_migration: bool,

    pub preserve_network_settings: bool,

    pub power_on_after_migration: bool,

    /// Case-insensitive substrings classifying an error as transient
    pub transient_signatures: Vec<String>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            max_concurrent_migrations: 2,
            task_timeout: Duration::from_secs(60 * 60),
            retry_attempts: 2,
            retry_delay: Duration::from_secs(5 * 60),
            create_snapshot: false,
            snapshot_name: "pre-migration".to_string(),
            validate_after_migration: true,
            remove_source_after_migration: false,
            preserve_network_settings: true,
            power_on_after_migration: false,
            transient_signatures: DEFAULT_TRANSIENT_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl MigrationSettings {
    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_migrations == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_migrations must be greater than 0".to_string(),
            ));
        }
        if self.task_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "timeout_minutes must be greater than 0".to_string(),
            ));
        }
        if self.create_snapshot && self.snapshot_name.trim().is_empty() {
            return Err(ConfigError::MissingField("snapshot_name".to_string()));
        }
        Ok(())
    }

    /// Whether the concurrency exceeds the recommended ceiling
    pub fn exceeds_recommended_concurrency(&self) -> bool {
        self.max_concurrent_migrations > RECOMMENDED_MAX_CONCURRENCY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(MigrationSettings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let settings = MigrationSettings {
            max_concurrent_migrations: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_snapshot_requires_name() {
        let settings = MigrationSettings {
            create_snapshot: true,
            snapshot_name: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_minutes_in_toml() {
        let settings: MigrationSettings =
            toml::from_str("timeout_minutes = 90\nretry_delay_minutes = 1\nretry_attempts = 4")
                .unwrap();
        assert_eq!(settings.task_timeout, Duration::from_secs(90 * 60));
        assert_eq!(settings.retry_delay, Duration::from_secs(60));
        assert_eq!(settings.retry_attempts, 4);
        assert_eq!(settings.max_concurrent_migrations, 2);
    }

    #[test]
    fn test_recommended_concurrency() {
        let settings = MigrationSettings {
            max_concurrent_migrations: 11,
            ..Default::default()
        };
        assert!(settings.exceeds_recommended_concurrency());
    }
}
