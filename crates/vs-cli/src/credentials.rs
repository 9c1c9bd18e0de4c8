//! Password material from the environment

use vs_core::config::ConnectionProfile;
use vs_core::error::ConfigError;
use vs_core::traits::CredentialProvider;
use vs_core::types::{EndpointRole, Secret};

/// Environment variable holding the password for `role`
pub fn password_var(role: EndpointRole) -> &'static str {
    match role {
        EndpointRole::Source => "VMSHIFT_SOURCE_PASSWORD",
        EndpointRole::Destination => "VMSHIFT_DESTINATION_PASSWORD",
    }
}

/// Reads `VMSHIFT_SOURCE_PASSWORD` / `VMSHIFT_DESTINATION_PASSWORD`
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn password(
        &self,
        role: EndpointRole,
        profile: &ConnectionProfile,
    ) -> Result<Secret, ConfigError> {
        let var = password_var(role);
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => Ok(Secret::new(value)),
            _ => Err(ConfigError::MissingField(format!(
                "{} (password for {} on {})",
                var, profile.username, profile.address
            ))),
        }
    }
}
