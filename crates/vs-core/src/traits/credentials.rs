//! Credential collaborator

use crate::config::ConnectionProfile;
use crate::error::ConfigError;
use crate::types::{EndpointRole, Secret};

/// Supplies password material for a connection profile.
///
/// Storage is owned by the implementor; the orchestration core only ever
/// sees the returned [`Secret`].
pub trait CredentialProvider: Send + Sync {
    fn password(&self, role: EndpointRole, profile: &ConnectionProfile)
        -> Result<Secret, ConfigError>;
}
