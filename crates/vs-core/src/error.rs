//! Core error types for vmshift

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::EndpointRole;

/// Top-level error type for the vmshift ecosystem
#[derive(Error, Debug)]
pub enum VsError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Script error
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Endpoint connection errors. Every variant names the role it concerns.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Another connect attempt for the same role is still running
    #[error("A connection attempt for the {0} endpoint is already in progress")]
    InProgress(EndpointRole),

    /// Endpoint unreachable or credentials rejected
    #[error("Failed to connect {role} endpoint {address}: {message}")]
    Failed {
        role: EndpointRole,
        address: String,
        message: String,
    },

    /// Operation needs a connected endpoint
    #[error("The {0} endpoint is not connected")]
    NotConnected(EndpointRole),

    /// A disconnect was requested while the connect attempt was running
    #[error("The {0} endpoint was disconnected while connecting")]
    Aborted(EndpointRole),

    /// Version lookup against a connected endpoint failed
    #[error("Version lookup on {role} endpoint failed: {source}")]
    VersionLookup {
        role: EndpointRole,
        #[source]
        source: ScriptError,
    },
}

impl ConnectionError {
    /// Role the error is attached to
    pub fn role(&self) -> EndpointRole {
        match self {
            ConnectionError::InProgress(role)
            | ConnectionError::NotConnected(role)
            | ConnectionError::Aborted(role) => *role,
            ConnectionError::Failed { role, .. } | ConnectionError::VersionLookup { role, .. } => {
                *role
            }
        }
    }
}

/// Errors raised by the script session pool and runtimes
#[derive(Error, Debug)]
pub enum ScriptError {
    /// No path registered for the logical script name
    #[error("Script '{0}' is not registered")]
    NotRegistered(String),

    /// `execute` called before the pool selected a runtime
    #[error("Script session pool is not initialized")]
    NotInitialized,

    /// Pool was disposed
    #[error("Script session pool has been disposed")]
    PoolDisposed,

    /// Toolkit probe failed
    #[error("Automation toolkit unavailable: {0}")]
    ToolkitUnavailable(String),

    /// The script wrote to its error stream or exited non-zero
    #[error("Script '{script}' reported an error: {message}")]
    Execution { script: String, message: String },

    /// The call did not finish within its timeout and was abandoned
    #[error("Script '{script}' timed out after {}s", after.as_secs())]
    Timeout { script: String, after: Duration },

    /// Cancellation was requested before the call started
    #[error("Script execution cancelled")]
    Cancelled,

    /// Spawning or talking to the runtime failed
    #[error("I/O error running script '{script}': {source}")]
    Io {
        script: String,
        #[source]
        source: std::io::Error,
    },
}

impl ScriptError {
    /// Whether this is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScriptError::Cancelled)
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required value
    #[error("Missing required value: {0}")]
    MissingField(String),
}
