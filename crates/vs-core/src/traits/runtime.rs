//! Script runtime capability

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::ScriptError;
use crate::types::{ExecutionMode, ScriptParams, SessionId};

/// A single call handed to a runtime
#[derive(Debug, Clone)]
pub struct ScriptInvocation {
    /// Logical script name, as registered with the pool
    pub script: String,
    /// Resolved filesystem path of the script
    pub path: PathBuf,
    /// Named parameters
    pub params: ScriptParams,
    /// Session the call is bound to
    pub session: SessionId,
}

/// Raw output of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    /// Accumulated output stream
    pub stdout: String,
    /// Accumulated error stream
    pub stderr: String,
    /// Process exit code (None if the runtime has no notion of one or the
    /// process was killed by a signal)
    pub exit_code: Option<i32>,
}

impl ScriptOutput {
    /// Successful output with an empty error stream
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Output carrying an error stream
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(1),
        }
    }
}

/// Executes scripts on behalf of the session pool.
///
/// Two implementations exist: one drives the real automation toolkit, the
/// other returns deterministic stub output. The pool picks one at
/// initialization and uses it for its whole lifetime.
#[async_trait]
pub trait ScriptRuntime: Send + Sync {
    /// Which mode this runtime represents
    fn mode(&self) -> ExecutionMode;

    /// Run one invocation to completion.
    ///
    /// Returning `Ok` with a non-empty `stderr` is not an error at this
    /// level; the pool decides how to classify the output. `Err` is reserved
    /// for failures to run the script at all.
    async fn invoke(&self, invocation: &ScriptInvocation) -> Result<ScriptOutput, ScriptError>;
}
