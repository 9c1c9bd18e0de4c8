//! Shared fixtures for orchestrator integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use vs_core::error::ScriptError;
use vs_core::scripts;
use vs_core::traits::{ProgressSink, ScriptInvocation, ScriptOutput, ScriptRuntime};
use vs_core::types::{EndpointRole, ExecutionMode, ScriptParams, Secret, TaskId};
use vs_core::{LogLevel, LogObservers};
use vs_orchestrator::{
    BackupOrchestrator, EndpointConnectionManager, MigrationOrchestrator, ScriptSessionPool,
};

/// What one scripted call does
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this output
    Ok(String),
    /// Write this to the error stream
    Fail(String),
    /// Sleep, then return this output
    Slow(Duration, String),
}

/// A recorded invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub script: String,
    pub object: Option<String>,
    pub params: ScriptParams,
}

type Hook = Box<dyn Fn(&ScriptInvocation) + Send + Sync>;

/// Runtime whose outcomes are scripted per script and object
pub struct FakeRuntime {
    steps: Mutex<HashMap<(String, Option<String>), VecDeque<Step>>>,
    calls: Mutex<Vec<Call>>,
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    hook: Mutex<Option<Hook>>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    /// Every call sleeps for `delay` before answering
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            hook: Mutex::new(None),
        })
    }

    /// Queue outcomes for `script`, optionally only for one object.
    /// Once the queue is empty calls succeed.
    pub fn script(&self, script: &str, object: Option<&str>, steps: Vec<Step>) {
        self.steps
            .lock()
            .insert((script.to_string(), object.map(str::to_string)), steps.into());
    }

    /// Run `hook` at the start of every invocation
    pub fn on_invoke<F>(&self, hook: F)
    where
        F: Fn(&ScriptInvocation) + Send + Sync + 'static,
    {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, script: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.script == script).count()
    }

    pub fn count_for(&self, script: &str, object: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.script == script && c.object.as_deref() == Some(object))
            .count()
    }

    /// Highest number of invocations running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_step(&self, script: &str, object: Option<&str>) -> Option<Step> {
        let mut steps = self.steps.lock();
        if let Some(object) = object {
            if let Some(queue) = steps.get_mut(&(script.to_string(), Some(object.to_string()))) {
                return queue.pop_front();
            }
        }
        steps
            .get_mut(&(script.to_string(), None))
            .and_then(|queue| queue.pop_front())
    }
}

#[async_trait]
impl ScriptRuntime for FakeRuntime {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Live
    }

    async fn invoke(&self, inv: &ScriptInvocation) -> Result<ScriptOutput, ScriptError> {
        let object = inv.params.get_str("ObjectName").map(str::to_string);
        self.calls.lock().push(Call {
            script: inv.script.clone(),
            object: object.clone(),
            params: inv.params.clone(),
        });
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(inv);
        }

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let output = match self.next_step(&inv.script, object.as_deref()) {
            None => ScriptOutput::ok(format!("{} ok", inv.script)),
            Some(Step::Ok(out)) => ScriptOutput::ok(out),
            Some(Step::Fail(err)) => ScriptOutput::failed(err),
            Some(Step::Slow(duration, out)) => {
                tokio::time::sleep(duration).await;
                ScriptOutput::ok(out)
            }
        };
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(output)
    }
}

/// Progress sink that records everything
#[derive(Default)]
pub struct RecordingProgress {
    pub details: Mutex<Vec<String>>,
    pub overall: Mutex<Vec<u8>>,
    pub tasks: Mutex<Vec<(TaskId, u8)>>,
}

impl RecordingProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn task_percentages(&self, id: TaskId) -> Vec<u8> {
        self.tasks
            .lock()
            .iter()
            .filter(|(t, _)| *t == id)
            .map(|(_, p)| *p)
            .collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_detail(&self, detail: &str) {
        self.details.lock().push(detail.to_string());
    }

    fn on_task_progress(&self, task_id: TaskId, percent: u8) {
        self.tasks.lock().push((task_id, percent));
    }

    fn on_overall_progress(&self, percent: u8) {
        self.overall.lock().push(percent);
    }
}

/// Pool, connection manager and log capture around a fake runtime
pub struct Harness {
    pub runtime: Arc<FakeRuntime>,
    pub logs: Arc<LogObservers>,
    pub pool: Arc<ScriptSessionPool>,
    pub connections: Arc<EndpointConnectionManager>,
    pub lines: Arc<Mutex<Vec<(String, LogLevel)>>>,
}

impl Harness {
    pub fn new(runtime: Arc<FakeRuntime>) -> Self {
        Self::with_capacity(runtime, 4)
    }

    pub fn with_capacity(runtime: Arc<FakeRuntime>, capacity: usize) -> Self {
        let logs = Arc::new(LogObservers::new());
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        logs.subscribe(move |msg, level| sink.lock().push((msg.to_string(), level)));

        let pool = ScriptSessionPool::with_runtime(
            capacity,
            Arc::clone(&runtime) as Arc<dyn ScriptRuntime>,
            Arc::clone(&logs),
        );
        for name in scripts::all() {
            pool.register_script(name, format!("/opt/vmshift/scripts/{}.ps1", name));
        }
        let pool = Arc::new(pool);
        let connections = Arc::new(EndpointConnectionManager::new(
            Arc::clone(&pool),
            Arc::clone(&logs),
        ));

        Self {
            runtime,
            logs,
            pool,
            connections,
            lines,
        }
    }

    pub async fn connect(&self, role: EndpointRole) {
        let address = match role {
            EndpointRole::Source => "vc-src.example.com",
            EndpointRole::Destination => "vc-dst.example.com",
        };
        self.connections
            .connect(
                role,
                address,
                "administrator@vsphere.local",
                Secret::new("s3cret"),
                &CancellationToken::new(),
            )
            .await
            .expect("connect");
    }

    pub async fn connect_both(&self) {
        self.connect(EndpointRole::Source).await;
        self.connect(EndpointRole::Destination).await;
    }

    pub fn backup(&self) -> BackupOrchestrator {
        BackupOrchestrator::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.connections),
            Arc::clone(&self.logs),
        )
    }

    pub fn migration(&self) -> MigrationOrchestrator {
        MigrationOrchestrator::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.connections),
            Arc::clone(&self.logs),
        )
    }

    /// Log lines at `level` containing `needle`
    pub fn logged(&self, level: LogLevel, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|(msg, l)| *l == level && msg.contains(needle))
    }
}
