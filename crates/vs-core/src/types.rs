//! Core domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Which side of a transfer an endpoint plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    /// Endpoint objects are read from (backup, migration origin)
    Source,
    /// Endpoint objects are migrated to
    Destination,
}

impl EndpointRole {
    /// Both roles, source first
    pub const ALL: [EndpointRole; 2] = [EndpointRole::Source, EndpointRole::Destination];
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointRole::Source => write!(f, "source"),
            EndpointRole::Destination => write!(f, "destination"),
        }
    }
}

/// Connection status for an endpoint role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No live endpoint
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// Endpoint is connected and usable
    Connected,
    /// The last connect attempt failed
    Failed,
}

impl ConnectionStatus {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Failed, Connecting)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connected, Disconnected)
                | (Failed, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a connection attempt as exposed to front ends
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResult {
    /// Whether the endpoint is connected
    pub connected: bool,
    /// Detected version, if it has been queried
    pub version: Option<String>,
    /// Error from the last failed attempt
    pub error: Option<String>,
}

/// Which script runtime the pool selected at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Real automation toolkit
    Live,
    /// Deterministic stub output
    Simulated,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Live => write!(f, "live"),
            ExecutionMode::Simulated => write!(f, "simulated"),
        }
    }
}

/// Kind of inventory object that can be migrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Host,
    Vm,
    Cluster,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Host => write!(f, "host"),
            ObjectType::Vm => write!(f, "vm"),
            ObjectType::Cluster => write!(f, "cluster"),
        }
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" | "hosts" => Ok(ObjectType::Host),
            "vm" | "vms" => Ok(ObjectType::Vm),
            "cluster" | "clusters" => Ok(ObjectType::Cluster),
            other => Err(format!("unknown object type '{}' (expected host, vm or cluster)", other)),
        }
    }
}

/// One unit of the backup pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupKind {
    SwitchConfig,
    UsersGroups,
    Roles,
    Permissions,
    HostConfig,
    VmConfig,
    ClusterConfig,
    ResourcePools,
    Folders,
}

impl BackupKind {
    /// Every kind in default pipeline order
    pub const ALL: [BackupKind; 9] = [
        BackupKind::SwitchConfig,
        BackupKind::UsersGroups,
        BackupKind::Roles,
        BackupKind::Permissions,
        BackupKind::HostConfig,
        BackupKind::VmConfig,
        BackupKind::ClusterConfig,
        BackupKind::ResourcePools,
        BackupKind::Folders,
    ];

    /// Stable kebab-case name, also used as artifact file stem
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::SwitchConfig => "switch-config",
            BackupKind::UsersGroups => "users-groups",
            BackupKind::Roles => "roles",
            BackupKind::Permissions => "permissions",
            BackupKind::HostConfig => "host-config",
            BackupKind::VmConfig => "vm-config",
            BackupKind::ClusterConfig => "cluster-config",
            BackupKind::ResourcePools => "resource-pools",
            BackupKind::Folders => "folders",
        }
    }

    /// Human-readable label for progress messages
    pub fn label(&self) -> &'static str {
        match self {
            BackupKind::SwitchConfig => "distributed switch configuration",
            BackupKind::UsersGroups => "users and groups",
            BackupKind::Roles => "roles",
            BackupKind::Permissions => "permissions",
            BackupKind::HostConfig => "host configuration",
            BackupKind::VmConfig => "VM configuration",
            BackupKind::ClusterConfig => "cluster configuration",
            BackupKind::ResourcePools => "resource pools",
            BackupKind::Folders => "folders",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('_', "-");
        BackupKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == needle)
            .ok_or_else(|| format!("unknown backup kind '{}'", s))
    }
}

/// Unique identifier for a migration task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Allocate a fresh random task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short form used in tables and log lines
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a pooled script session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Opaque password material handed over by a credential collaborator.
///
/// Never printed: `Debug` and `Display` are redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw value for handing to a script
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Named parameters passed to a script invocation.
///
/// Keys follow the toolkit's parameter naming (`Server`, `ObjectName`, ...).
/// Any key containing "password" is treated as secret: it is redacted from
/// `Debug` output and skipped by [`ScriptParams::public_entries`].
#[derive(Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScriptParams(BTreeMap<String, serde_json::Value>);

impl ScriptParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a parameter
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Get a parameter as a string slice, if it is a JSON string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every entry in key order, secrets included
    pub fn entries(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// Entries safe to log or hash, in key order
    pub fn public_entries(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter().filter(|(k, _)| !is_secret_key(k))
    }
}

fn is_secret_key(key: &str) -> bool {
    key.to_ascii_lowercase().contains("password")
}

impl fmt::Debug for ScriptParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.0 {
            if is_secret_key(k) {
                map.entry(k, &"***");
            } else {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_status_display() {
        assert_eq!(format!("{}", ConnectionStatus::Connected), "connected");
        assert_eq!(format!("{}", ConnectionStatus::Failed), "failed");
    }

    #[test]
    fn test_connection_status_transitions() {
        use ConnectionStatus::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Failed.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Failed));
    }

    #[test]
    fn test_backup_kind_parse() {
        assert_eq!("roles".parse::<BackupKind>().unwrap(), BackupKind::Roles);
        assert_eq!("VM_Config".parse::<BackupKind>().unwrap(), BackupKind::VmConfig);
        assert!("snapshots".parse::<BackupKind>().is_err());
    }

    #[test]
    fn test_object_type_parse() {
        assert_eq!("VMs".parse::<ObjectType>().unwrap(), ObjectType::Vm);
        assert!("datastore".parse::<ObjectType>().is_err());
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_script_params_redact_passwords() {
        let params = ScriptParams::new()
            .with("Server", "vc01.example.com")
            .with("Password", "hunter2");
        let debug = format!("{:?}", params);
        assert!(debug.contains("vc01.example.com"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(params.public_entries().count(), 1);
    }

    #[test]
    fn test_task_id_short() {
        let id = TaskId::new();
        assert_eq!(id.short().len(), 8);
    }
}
