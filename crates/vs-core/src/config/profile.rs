//! Connection profile configuration

use serde::{Deserialize, Serialize};

/// Saved address and user for an endpoint. Passwords never live here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Profile name (the key in `[profiles.<name>]`)
    #[serde(default)]
    pub name: String,

    /// Endpoint address (hostname or IP)
    pub address: String,

    /// User to authenticate as
    pub username: String,

    /// Notes/description for this endpoint
    #[serde(default)]
    pub notes: Option<String>,
}

impl ConnectionProfile {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            username: username.into(),
            notes: None,
        }
    }
}
