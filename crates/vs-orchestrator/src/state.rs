//! Shared orchestrator services

use std::sync::Arc;

use vs_core::config::AppConfig;
use vs_core::types::ExecutionMode;
use vs_core::LogObservers;

use crate::backup::BackupOrchestrator;
use crate::connection::EndpointConnectionManager;
use crate::migration::MigrationOrchestrator;
use crate::script::{ScriptSessionPool, SimulatedRuntime};

/// Services wired together once per process and passed by reference
pub struct OrchestratorState {
    /// Configuration
    pub config: AppConfig,
    /// Log observers shared by every component
    pub logs: Arc<LogObservers>,
    /// Script session pool
    pub pool: Arc<ScriptSessionPool>,
    /// Endpoint connections
    pub connections: Arc<EndpointConnectionManager>,
}

impl OrchestratorState {
    /// Build the services and register every configured script.
    ///
    /// The pool still has to be initialized with [`initialize`](Self::initialize).
    pub fn new(config: AppConfig) -> Self {
        let logs = Arc::new(LogObservers::new());
        let pool = Arc::new(ScriptSessionPool::new(
            config.toolkit.clone(),
            Arc::clone(&logs),
        ));
        Self::assemble(config, logs, pool)
    }

    /// Build the services on the simulated runtime without probing
    pub fn simulated(config: AppConfig) -> Self {
        let logs = Arc::new(LogObservers::new());
        let pool = Arc::new(ScriptSessionPool::preselected(
            config.toolkit.clone(),
            Arc::new(SimulatedRuntime::new()),
            Arc::clone(&logs),
        ));
        Self::assemble(config, logs, pool)
    }

    fn assemble(config: AppConfig, logs: Arc<LogObservers>, pool: Arc<ScriptSessionPool>) -> Self {
        pool.register_defaults(&config);
        let connections = Arc::new(EndpointConnectionManager::new(
            Arc::clone(&pool),
            Arc::clone(&logs),
        ));
        Self {
            config,
            logs,
            pool,
            connections,
        }
    }

    /// Probe the toolkit and select the runtime
    pub async fn initialize(&self) -> ExecutionMode {
        self.pool.initialize().await
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

    /// Disconnect both endpoints and release the pool
    pub async fn shutdown(&self) {
        self.connections.disconnect_all().await;
        self.pool.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use vs_core::scripts;
    use vs_core::types::{EndpointRole, Secret};

    #[tokio::test]
    async fn test_simulated_state_registers_defaults() {
        let state = OrchestratorState::simulated(AppConfig::default());
        assert_eq!(state.pool.mode(), Some(ExecutionMode::Simulated));
        assert!(state.pool.ensure_registered(&scripts::all()).is_ok());

        state
            .connections
            .connect(
                EndpointRole::Source,
                "vc01",
                "admin",
                Secret::new("pw"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        state.shutdown().await;
        assert_eq!(state.connections.live_endpoints(), 0);
        assert!(state.pool.is_disposed());
    }
}
