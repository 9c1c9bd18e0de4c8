//! Script session pool
//!
//! The pool is the only way the orchestration engine talks to the
//! automation toolkit. It owns:
//!
//! - the registration table resolving logical script names to files,
//! - the runtime (live toolkit or simulation), chosen once by [`initialize`],
//! - a fixed number of sessions guarded by a semaphore, so no more than
//!   `capacity` invocations are ever in flight.
//!
//! # Cancellation
//!
//! The token is checked before waiting for a session, while waiting, and
//! again right before the call. A call that has started is never preempted.
//! A call that exceeds its timeout is abandoned: the runtime future is
//! dropped (killing a live process) and its session is discarded; a fresh
//! session takes its place on the next checkout.
//!
//! [`initialize`]: ScriptSessionPool::initialize

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;

use vs_core::config::{AppConfig, ToolkitConfig};
use vs_core::error::ScriptError;
use vs_core::traits::{ScriptInvocation, ScriptOutput, ScriptRuntime};
use vs_core::types::{ExecutionMode, ScriptParams};
use vs_core::LogObservers;

use super::live::LiveRuntime;
use super::registry::ScriptRegistry;
use super::session::{ScriptSession, SessionFactory};
use super::simulated::SimulatedRuntime;

/// Point-in-time view of the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Selected runtime, `None` before initialization
    pub mode: Option<ExecutionMode>,
    pub capacity: usize,
    pub idle: usize,
    pub in_use: usize,
    pub created: u64,
    pub discarded: u64,
    pub registered: usize,
}

/// Manages execution sessions for the external scripting runtime
pub struct ScriptSessionPool {
    toolkit: ToolkitConfig,
    capacity: usize,
    registry: ScriptRegistry,
    runtime: OnceCell<Arc<dyn ScriptRuntime>>,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<ScriptSession>>,
    factory: SessionFactory,
    disposed: AtomicBool,
    logs: Arc<LogObservers>,
}

impl ScriptSessionPool {
    /// Create an uninitialized pool for the configured toolkit
    pub fn new(toolkit: ToolkitConfig, logs: Arc<LogObservers>) -> Self {
        let capacity = toolkit.effective_capacity();
        Self {
            toolkit,
            capacity,
            registry: ScriptRegistry::new(),
            runtime: OnceCell::new(),
            permits: Arc::new(Semaphore::new(capacity)),
            idle: Mutex::new(Vec::with_capacity(capacity)),
            factory: SessionFactory::new(),
            disposed: AtomicBool::new(false),
            logs,
        }
    }

    /// Create a pool that is already initialized with the given runtime
    pub fn with_runtime(
        capacity: usize,
        runtime: Arc<dyn ScriptRuntime>,
        logs: Arc<LogObservers>,
    ) -> Self {
        let toolkit = ToolkitConfig {
            pool_capacity: capacity,
            ..Default::default()
        };
        Self::preselected(toolkit, runtime, logs)
    }

    /// Create a pool for `toolkit` that skips probing and uses `runtime`
    pub fn preselected(
        toolkit: ToolkitConfig,
        runtime: Arc<dyn ScriptRuntime>,
        logs: Arc<LogObservers>,
    ) -> Self {
        let mut pool = Self::new(toolkit, logs);
        pool.runtime = OnceCell::new_with(Some(runtime));
        pool.fill_sessions();
        pool
    }

    /// Probe the toolkit and select the runtime.
    ///
    /// Falls back to simulation when the probe fails; this is logged as a
    /// warning and never returned as an error. Calling this again returns
    /// the mode selected the first time.
    pub async fn initialize(&self) -> ExecutionMode {
        let runtime = self
            .runtime
            .get_or_init(|| async {
                let runtime: Arc<dyn ScriptRuntime> = match LiveRuntime::probe(&self.toolkit).await
                {
                    Ok(version) => {
                        self.logs.info(format!(
                            "Automation toolkit {} detected via '{}'; script execution is live",
                            version, self.toolkit.program
                        ));
                        Arc::new(LiveRuntime::new(&self.toolkit))
                    }
                    Err(e) => {
                        self.logs
                            .warn(format!("{}; continuing in simulation mode", e));
                        Arc::new(SimulatedRuntime::new())
                    }
                };
                self.fill_sessions();
                runtime
            })
            .await;
        runtime.mode()
    }

    /// Selected runtime mode, `None` before initialization
    pub fn mode(&self) -> Option<ExecutionMode> {
        self.runtime.get().map(|r| r.mode())
    }

    /// Maximum concurrent invocations
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register or replace a script path
    pub fn register_script(&self, name: impl Into<String>, path: impl AsRef<Path>) {
        let name = name.into();
        if let Some(previous) = self.registry.register(name.clone(), path.as_ref()) {
            if previous != path.as_ref() {
                tracing::debug!(
                    "Script {} re-registered: {} -> {}",
                    name,
                    previous.display(),
                    path.as_ref().display()
                );
            }
        }
    }

    /// Register a whole table
    pub fn register_all<I>(&self, table: I)
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        for (name, path) in table {
            self.register_script(name, path);
        }
    }

    /// Register every well-known script from the configured script directory,
    /// then the `[scripts]` overrides
    pub fn register_defaults(&self, config: &AppConfig) {
        self.register_all(config.script_table());
    }

    /// Fail with `NotRegistered` naming every script in `names` that has no path
    pub fn ensure_registered(&self, names: &[&str]) -> Result<(), ScriptError> {
        let missing = self.registry.missing(names);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ScriptError::NotRegistered(missing.join(", ")))
        }
    }

    /// Registered scripts sorted by name
    pub fn registered_scripts(&self) -> Vec<(String, PathBuf)> {
        self.registry.list()
    }

    /// Run a script with the toolkit's default timeout
    pub async fn execute(
        &self,
        script: &str,
        params: ScriptParams,
        cancel: &CancellationToken,
    ) -> Result<String, ScriptError> {
        self.execute_with_timeout(script, params, self.toolkit.default_timeout, cancel)
            .await
    }

    /// Run a script, abandoning it after `timeout`.
    ///
    /// Returns the accumulated output stream. A non-empty error stream or a
    /// non-zero exit code yields [`ScriptError::Execution`].
    pub async fn execute_with_timeout(
        &self,
        script: &str,
        params: ScriptParams,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ScriptError> {
        if self.is_disposed() {
            return Err(ScriptError::PoolDisposed);
        }
        let runtime = self
            .runtime
            .get()
            .cloned()
            .ok_or(ScriptError::NotInitialized)?;
        let path = self
            .registry
            .resolve(script)
            .ok_or_else(|| ScriptError::NotRegistered(script.to_string()))?;

        if cancel.is_cancelled() {
            return Err(ScriptError::Cancelled);
        }

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScriptError::Cancelled),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| ScriptError::PoolDisposed)?
            }
        };

        if cancel.is_cancelled() {
            return Err(ScriptError::Cancelled);
        }

        let mut session = self.checkout();
        session.calls += 1;
        let invocation = ScriptInvocation {
            script: script.to_string(),
            path,
            params,
            session: session.id,
        };

        tracing::debug!("Executing {} on {}", script, session.id);

        match tokio::time::timeout(timeout, runtime.invoke(&invocation)).await {
            Err(_) => {
                self.factory.discard(session, "call abandoned after timeout");
                self.logs.warn(format!(
                    "Script {} exceeded {}s and was abandoned; its session will be replaced",
                    script,
                    timeout.as_secs()
                ));
                Err(ScriptError::Timeout {
                    script: script.to_string(),
                    after: timeout,
                })
            }
            Ok(Err(e)) => {
                self.factory.discard(session, "runtime failure");
                Err(e)
            }
            Ok(Ok(output)) => {
                self.checkin(session);
                output_to_result(script, output)
            }
        }
    }

    /// Release every idle session and refuse further calls. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.permits.close();
        let sessions = std::mem::take(&mut *self.idle.lock());
        let released = sessions.len();
        for session in sessions {
            self.factory.discard(session, "pool disposed");
        }
        self.logs.info(format!(
            "Script session pool disposed ({} idle sessions released)",
            released
        ));
    }

    /// Whether [`dispose`](Self::dispose) has been called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Current counters
    pub fn stats(&self) -> PoolStats {
        let in_use = if self.permits.is_closed() {
            0
        } else {
            self.capacity - self.permits.available_permits()
        };
        PoolStats {
            mode: self.mode(),
            capacity: self.capacity,
            idle: self.idle.lock().len(),
            in_use,
            created: self.factory.created(),
            discarded: self.factory.discarded(),
            registered: self.registry.len(),
        }
    }

    fn fill_sessions(&self) {
        let mut idle = self.idle.lock();
        while idle.len() < self.capacity {
            idle.push(self.factory.create());
        }
    }

    fn checkout(&self) -> ScriptSession {
        self.idle.lock().pop().unwrap_or_else(|| self.factory.create())
    }

    fn checkin(&self, session: ScriptSession) {
        if self.is_disposed() {
            self.factory.discard(session, "pool disposed");
        } else {
            self.idle.lock().push(session);
        }
    }
}

impl std::fmt::Debug for ScriptSessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptSessionPool")
            .field("stats", &self.stats())
            .finish()
    }
}

fn output_to_result(script: &str, output: ScriptOutput) -> Result<String, ScriptError> {
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return Err(ScriptError::Execution {
            script: script.to_string(),
            message: stderr.to_string(),
        });
    }
    match output.exit_code {
        Some(code) if code != 0 => Err(ScriptError::Execution {
            script: script.to_string(),
            message: format!("exited with code {}", code),
        }),
        _ => Ok(output.stdout.trim_end().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Runtime that echoes the script name, or fails/hangs on request
    struct EchoRuntime {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl EchoRuntime {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl ScriptRuntime for EchoRuntime {
        fn mode(&self) -> ExecutionMode {
            ExecutionMode::Live
        }

        async fn invoke(&self, inv: &ScriptInvocation) -> Result<ScriptOutput, ScriptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match inv.script.as_str() {
                "stderr" => Ok(ScriptOutput::failed("Permission denied")),
                "exit" => Ok(ScriptOutput {
                    stdout: "partial".into(),
                    stderr: String::new(),
                    exit_code: Some(2),
                }),
                other => Ok(ScriptOutput::ok(format!("ran {}\n", other))),
            }
        }
    }

    fn pool_with(runtime: Arc<EchoRuntime>, capacity: usize) -> ScriptSessionPool {
        let pool = ScriptSessionPool::with_runtime(capacity, runtime, Arc::new(LogObservers::new()));
        for name in ["echo", "stderr", "exit"] {
            pool.register_script(name, format!("/scripts/{}.ps1", name));
        }
        pool
    }

    #[tokio::test]
    async fn test_execute_returns_output() {
        let pool = pool_with(EchoRuntime::new(Duration::ZERO), 2);
        let out = pool
            .execute("echo", ScriptParams::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "ran echo");
    }

    #[tokio::test]
    async fn test_error_stream_is_execution_error() {
        let pool = pool_with(EchoRuntime::new(Duration::ZERO), 1);
        let err = pool
            .execute("stderr", ScriptParams::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ScriptError::Execution { script, message } => {
                assert_eq!(script, "stderr");
                assert_eq!(message, "Permission denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_error() {
        let pool = pool_with(EchoRuntime::new(Duration::ZERO), 1);
        let err = pool
            .execute("exit", ScriptParams::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with code 2"));
    }

    #[tokio::test]
    async fn test_unregistered_script_fails_before_session_use() {
        let runtime = EchoRuntime::new(Duration::ZERO);
        let pool = pool_with(Arc::clone(&runtime), 1);
        let err = pool
            .execute("Backup-Roles", ScriptParams::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::NotRegistered(name) if name == "Backup-Roles"));
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_invocation() {
        let runtime = EchoRuntime::new(Duration::ZERO);
        let pool = pool_with(Arc::clone(&runtime), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pool
            .execute("echo", ScriptParams::new(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_discards_session() {
        let pool = pool_with(EchoRuntime::new(Duration::from_secs(60)), 1);
        let err = pool
            .execute_with_timeout(
                "echo",
                ScriptParams::new(),
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Timeout { .. }));

        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_capacity() {
        let runtime = EchoRuntime::new(Duration::from_millis(100));
        let pool = Arc::new(pool_with(Arc::clone(&runtime), 2));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                pool.execute("echo", ScriptParams::new(), &CancellationToken::new())
                    .await
            }));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.stats().in_use, 2);

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let stats = pool.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.idle, 2);
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let pool = pool_with(EchoRuntime::new(Duration::ZERO), 3);
        assert_eq!(pool.stats().idle, 3);

        pool.dispose();
        pool.dispose();

        assert!(pool.is_disposed());
        assert_eq!(pool.stats().idle, 0);
        assert_eq!(pool.stats().discarded, 3);
        let err = pool
            .execute("echo", ScriptParams::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::PoolDisposed));
    }

    #[tokio::test]
    async fn test_uninitialized_pool_rejects_calls() {
        let pool = ScriptSessionPool::new(ToolkitConfig::default(), Arc::new(LogObservers::new()));
        pool.register_script("echo", "/scripts/echo.ps1");
        let err = pool
            .execute("echo", ScriptParams::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::NotInitialized));
        assert_eq!(pool.mode(), None);
    }

    #[test]
    fn test_ensure_registered_names_all_missing() {
        let pool = pool_with(EchoRuntime::new(Duration::ZERO), 1);
        assert!(pool.ensure_registered(&["echo"]).is_ok());
        let err = pool.ensure_registered(&["a", "echo", "b"]).unwrap_err();
        assert_eq!(err.to_string(), "Script 'a, b' is not registered");
    }
}
