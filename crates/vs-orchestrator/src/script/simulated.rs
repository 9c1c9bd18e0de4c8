//! Deterministic stand-in for the automation toolkit
//!
//! Used when the toolkit probe fails so the whole pipeline can still be
//! exercised. Output depends only on the script name and its non-secret
//! parameters, never on time or session.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use vs_core::error::ScriptError;
use vs_core::scripts;
use vs_core::traits::{ScriptInvocation, ScriptOutput, ScriptRuntime};
use vs_core::types::{ExecutionMode, ScriptParams};

/// Version reported by the simulated endpoint
pub const SIMULATED_VERSION: &str = "8.0.2 (simulated)";

/// Returns canned output for every script
#[derive(Debug, Default)]
pub struct SimulatedRuntime;

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self
    }

    /// Stub output for a script call
    pub fn respond(script: &str, params: &ScriptParams) -> String {
        let digest = digest(script, params);
        match script {
            scripts::GET_VERSION => SIMULATED_VERSION.to_string(),
            scripts::CONNECT => format!(
                "Connected to {} as {} (simulated session {})",
                params.get_str("Server").unwrap_or("unknown"),
                params.get_str("User").unwrap_or("unknown"),
                digest
            ),
            _ => format!("[simulated] {} completed ({})", script, digest),
        }
    }
}

/// First 12 hex chars of SHA-256 over the script name and public parameters
fn digest(script: &str, params: &ScriptParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(script.as_bytes());
    for (key, value) in params.public_entries() {
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
        hasher.update([b'=']);
        hasher.update(value.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())[..12].to_string()
}

#[async_trait]
impl ScriptRuntime for SimulatedRuntime {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Simulated
    }

    async fn invoke(&self, invocation: &ScriptInvocation) -> Result<ScriptOutput, ScriptError> {
        Ok(ScriptOutput::ok(Self::respond(
            &invocation.script,
            &invocation.params,
        )))
    }
}
