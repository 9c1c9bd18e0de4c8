//! Runtime backed by the real automation toolkit
//!
//! Each invocation spawns the toolkit program with the configured script
//! arguments followed by the script path. Parameters are piped to stdin as a
//! JSON object so secrets never show up in the process table.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use vs_core::config::ToolkitConfig;
use vs_core::error::ScriptError;
use vs_core::traits::{ScriptInvocation, ScriptOutput, ScriptRuntime};
use vs_core::types::ExecutionMode;

/// Maximum stdout or stderr captured per stream (10 MiB)
const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

/// Environment variable carrying the session id into the script
pub const SESSION_ENV_VAR: &str = "VMSHIFT_SESSION_ID";

/// Spawns the toolkit for every call
pub struct LiveRuntime {
    program: String,
    script_args: Vec<String>,
}

impl LiveRuntime {
    pub fn new(config: &ToolkitConfig) -> Self {
        Self {
            program: config.program.clone(),
            script_args: config.script_args.clone(),
        }
    }

    /// Check that the toolkit is installed and usable.
    ///
    /// Returns the first line the probe printed (usually a module version).
    pub async fn probe(config: &ToolkitConfig) -> Result<String, ScriptError> {
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.probe_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(config.probe_timeout, cmd.output())
            .await
            .map_err(|_| {
                ScriptError::ToolkitUnavailable(format!(
                    "probe did not finish within {}s",
                    config.probe_timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                ScriptError::ToolkitUnavailable(format!("cannot run '{}': {}", config.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScriptError::ToolkitUnavailable(format!(
                "probe exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ScriptError::ToolkitUnavailable("probe found no toolkit module".to_string())
            })
    }
}

#[async_trait]
impl ScriptRuntime for LiveRuntime {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Live
    }

    async fn invoke(&self, invocation: &ScriptInvocation) -> Result<ScriptOutput, ScriptError> {
        let io_err = |source: std::io::Error| ScriptError::Io {
            script: invocation.script.clone(),
            source,
        };

        tracing::debug!(
            "Invoking {} ({}) on {} with {:?}",
            invocation.script,
            invocation.path.display(),
            invocation.session,
            invocation.params
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.script_args)
            .arg(&invocation.path)
            .env(SESSION_ENV_VAR, invocation.session.0.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // An abandoned call drops this future; the process must go with it
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(io_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(&invocation.params)
                .map_err(|e| io_err(std::io::Error::other(e)))?;
            // The script may close stdin without reading it
            if let Err(e) = stdin.write_all(&payload).await {
                tracing::debug!(
                    "Could not pass parameters to {} on stdin: {}",
                    invocation.script,
                    e
                );
            }
            drop(stdin);
        }

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let status = child.wait().await.map_err(io_err)?;
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(ScriptOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code(),
        })
    }
}

/// Read a whole stream, capped at [`MAX_OUTPUT_BYTES`]
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use vs_core::types::{ScriptParams, SessionId};

    fn sh_config() -> ToolkitConfig {
        ToolkitConfig {
            program: "sh".to_string(),
            script_args: vec![],
            probe_args: vec!["-c".to_string(), "echo 13.2.1".to_string()],
            probe_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn write_script(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("script.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_probe_reports_first_line() {
        let version = LiveRuntime::probe(&sh_config()).await.unwrap();
        assert_eq!(version, "13.2.1");
    }

    #[tokio::test]
    async fn test_probe_missing_program() {
        let config = ToolkitConfig {
            program: "vmshift-no-such-toolkit".to_string(),
            ..sh_config()
        };
        let err = LiveRuntime::probe(&config).await.unwrap_err();
        assert!(matches!(err, ScriptError::ToolkitUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invoke_pipes_params_and_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(&dir, "cat\necho\necho \"session=$VMSHIFT_SESSION_ID\"\n");
        let runtime = LiveRuntime::new(&sh_config());

        let output = runtime
            .invoke(&ScriptInvocation {
                script: "Echo".to_string(),
                path,
                params: ScriptParams::new().with("Server", "vc01"),
                session: SessionId(7),
            })
            .await
            .unwrap();

        assert!(output.stdout.contains(r#""Server":"vc01""#));
        assert!(output.stdout.contains("session=7"));
        assert!(output.stderr.is_empty());
        assert_eq!(output.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_invoke_captures_error_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(&dir, "echo 'object not found' >&2\nexit 3\n");
        let runtime = LiveRuntime::new(&sh_config());

        let output = runtime
            .invoke(&ScriptInvocation {
                script: "Fail".to_string(),
                path,
                params: ScriptParams::new(),
                session: SessionId(1),
            })
            .await
            .unwrap();

        assert_eq!(output.stderr.trim(), "object not found");
        assert_eq!(output.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_invoke_survives_script_that_ignores_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(&dir, "exec 0<&-\necho done\n");
        let runtime = LiveRuntime::new(&sh_config());

        // Larger than a pipe buffer so the write cannot complete
        let output = runtime
            .invoke(&ScriptInvocation {
                script: "NoInput".to_string(),
                path,
                params: ScriptParams::new().with("Blob", "x".repeat(1024 * 1024)),
                session: SessionId(2),
            })
            .await
            .unwrap();

        assert_eq!(output.stdout.trim(), "done");
        assert_eq!(output.exit_code, Some(0));
    }
}
