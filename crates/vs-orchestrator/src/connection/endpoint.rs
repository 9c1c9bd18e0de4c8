//! Live endpoint handle

use std::fmt;

use tokio::sync::OnceCell;
use uuid::Uuid;

use vs_core::time::current_time_millis;
use vs_core::types::{EndpointRole, ScriptParams, Secret};

/// A connected virtualization management endpoint.
///
/// Handles are shared as `Arc<Endpoint>`. When a role is reconnected the old
/// handle is closed and removed from the manager; clones held elsewhere stay
/// readable but are no longer live.
pub struct Endpoint {
    /// Connection identifier, unique per successful connect
    pub id: Uuid,
    pub role: EndpointRole,
    pub address: String,
    pub username: String,
    credential: Secret,
    /// Unix milliseconds when the connect script succeeded
    pub connected_at: u64,
    /// Output of the connect script
    pub banner: String,
    pub(crate) version: OnceCell<String>,
}

impl Endpoint {
    pub(crate) fn new(
        role: EndpointRole,
        address: impl Into<String>,
        username: impl Into<String>,
        credential: Secret,
        banner: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            address: address.into(),
            username: username.into(),
            credential,
            connected_at: current_time_millis(),
            banner,
            version: OnceCell::new(),
        }
    }

    /// Version string, if it has been looked up
    pub fn cached_version(&self) -> Option<&str> {
        self.version.get().map(String::as_str)
    }

    /// Parameters every script run against this endpoint receives
    pub fn script_params(&self) -> ScriptParams {
        connect_params(&self.address, &self.username, &self.credential)
    }
}

pub(crate) fn connect_params(address: &str, username: &str, password: &Secret) -> ScriptParams {
    ScriptParams::new()
        .with("Server", address)
        .with("User", username)
        .with("Password", password.expose())
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("credential", &self.credential)
            .field("version", &self.version.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_credential() {
        let endpoint = Endpoint::new(
            EndpointRole::Source,
            "vc01.example.com",
            "admin",
            Secret::new("hunter2"),
            String::new(),
        );
        let text = format!("{:?}", endpoint);
        assert!(text.contains("vc01.example.com"));
        assert!(!text.contains("hunter2"));
        assert!(format!("{:?}", endpoint.script_params()).contains("***"));
        assert_eq!(endpoint.script_params().get_str("Password"), Some("hunter2"));
    }
}
