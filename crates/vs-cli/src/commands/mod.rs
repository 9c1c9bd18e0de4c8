//! CLI command implementations

mod backup;
mod config;
mod connect;
mod migrate;
mod scripts;

pub use backup::{backup_command, BackupOptions};
pub use config::{config_init, config_path, config_show};
pub use connect::connect_command;
pub use migrate::{migrate_command, MigrateOptions};
pub use scripts::scripts_command;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use vs_core::config::{AppConfig, ConnectionProfile};
use vs_core::traits::CredentialProvider;
use vs_core::types::EndpointRole;
use vs_orchestrator::{Endpoint, OrchestratorState};

/// Resolve an endpoint argument: a profile name from the config, or
/// `user@address`. The user part may itself contain `@`.
pub fn resolve_endpoint(config: &AppConfig, spec: &str) -> Result<ConnectionProfile> {
    if let Some(profile) = config.profile(spec) {
        return Ok(profile);
    }
    match spec.rsplit_once('@') {
        Some((username, address)) if !username.is_empty() && !address.is_empty() => {
            Ok(ConnectionProfile::new(spec, address, username))
        }
        _ => bail!(
            "'{}' is neither a configured profile nor user@address",
            spec
        ),
    }
}

/// Look up the password for `profile` and connect it as `role`
pub(crate) async fn connect_profile(
    state: &OrchestratorState,
    role: EndpointRole,
    profile: &ConnectionProfile,
    credentials: &dyn CredentialProvider,
    cancel: &CancellationToken,
) -> Result<Arc<Endpoint>> {
    let password = credentials.password(role, profile)?;
    state
        .connections
        .connect(role, &profile.address, &profile.username, password, cancel)
        .await
        .with_context(|| format!("Could not connect {} endpoint '{}'", role, profile.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_profile_by_name() {
        let mut config = AppConfig::default();
        config.profiles.insert(
            "lab".to_string(),
            ConnectionProfile::new("", "vc-lab.example.com", "admin"),
        );
        let profile = resolve_endpoint(&config, "lab").unwrap();
        assert_eq!(profile.name, "lab");
        assert_eq!(profile.address, "vc-lab.example.com");
    }

    #[test]
    fn test_resolve_user_at_address() {
        let config = AppConfig::default();
        let profile =
            resolve_endpoint(&config, "administrator@vsphere.local@vc01.example.com").unwrap();
        assert_eq!(profile.username, "administrator@vsphere.local");
        assert_eq!(profile.address, "vc01.example.com");
    }

    #[test]
    fn test_resolve_rejects_bare_name() {
        let config = AppConfig::default();
        assert!(resolve_endpoint(&config, "unknown").is_err());
        assert!(resolve_endpoint(&config, "@vc01").is_err());
    }
}
