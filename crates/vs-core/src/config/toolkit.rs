//! Automation toolkit configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// How to reach the external automation toolkit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    /// Executable that hosts the scripting runtime
    pub program: String,

    /// Arguments placed before the script path on every invocation
    pub script_args: Vec<String>,

    /// Arguments for the availability probe. The probe succeeds when the
    /// program exits 0 and prints something.
    pub probe_args: Vec<String>,

    /// How long the probe may take before the toolkit is deemed unavailable
    #[serde(with = "duration_secs")]
    pub probe_timeout: Duration,

    /// Timeout for calls that do not specify their own (connect, backup)
    #[serde(with = "duration_secs")]
    pub default_timeout: Duration,

    /// Number of concurrent script sessions
    pub pool_capacity: usize,

    /// Directory holding the default script files
    pub script_dir: PathBuf,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            program: "pwsh".to_string(),
            script_args: vec![
                "-NoLogo".to_string(),
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-File".to_string(),
            ],
            probe_args: vec![
                "-NoLogo".to_string(),
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-Command".to_string(),
                "Get-Module -ListAvailable -Name VMware.PowerCLI | Select-Object -First 1 -ExpandProperty Version"
                    .to_string(),
            ],
            probe_timeout: Duration::from_secs(30),
            default_timeout: Duration::from_secs(1800),
            pool_capacity: 4,
            script_dir: PathBuf::from("scripts"),
        }
    }
}

impl ToolkitConfig {
    /// Capacity clamped to at least one session
    pub fn effective_capacity(&self) -> usize {
        self.pool_capacity.max(1)
    }
}
