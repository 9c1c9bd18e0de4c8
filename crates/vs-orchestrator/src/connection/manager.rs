//! Endpoint connection manager
//!
//! Tracks the source and destination endpoints independently. Each role has
//! its own slot holding the status, the live endpoint (if any) and the error
//! from the last failed attempt.
//!
//! # State machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected | Failed
//! Connected    -> Disconnected
//! Failed       -> Connecting | Disconnected
//! ```
//!
//! A disconnect that lands while a connect is in flight bumps the slot's
//! generation. The attempt then ends `Failed -> Disconnected` and its
//! endpoint, if it got one, is closed instead of installed.
//!
//! Every transition is reported through [`LogObservers`].

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use vs_core::error::{ConnectionError, ScriptError};
use vs_core::scripts;
use vs_core::types::{ConnectionResult, ConnectionStatus, EndpointRole, Secret};
use vs_core::{LogLevel, LogObservers};

use super::endpoint::{connect_params, Endpoint};
use crate::script::ScriptSessionPool;

#[derive(Debug)]
struct SlotState {
    status: ConnectionStatus,
    endpoint: Option<Arc<Endpoint>>,
    last_error: Option<String>,
    /// Bumped by every disconnect
    generation: u64,
}

/// Per-role state. The connect guard is held for the whole connect attempt.
struct RoleSlot {
    connect_guard: Mutex<()>,
    state: RwLock<SlotState>,
}

impl RoleSlot {
    fn new() -> Self {
        Self {
            connect_guard: Mutex::new(()),
            state: RwLock::new(SlotState {
                status: ConnectionStatus::Disconnected,
                endpoint: None,
                last_error: None,
                generation: 0,
            }),
        }
    }
}

/// Manages the connection lifecycle of both endpoint roles
pub struct EndpointConnectionManager {
    pool: Arc<ScriptSessionPool>,
    logs: Arc<LogObservers>,
    source: RoleSlot,
    destination: RoleSlot,
}

impl EndpointConnectionManager {
    pub fn new(pool: Arc<ScriptSessionPool>, logs: Arc<LogObservers>) -> Self {
        Self {
            pool,
            logs,
            source: RoleSlot::new(),
            destination: RoleSlot::new(),
        }
    }

    fn slot(&self, role: EndpointRole) -> &RoleSlot {
        match role {
            EndpointRole::Source => &self.source,
            EndpointRole::Destination => &self.destination,
        }
    }

    /// Connect `role` to `address`.
    ///
    /// A second attempt for the same role while one is running is rejected
    /// with [`ConnectionError::InProgress`]. A connected endpoint for the role
    /// is closed before the new attempt starts.
    pub async fn connect(
        &self,
        role: EndpointRole,
        address: &str,
        username: &str,
        password: Secret,
        cancel: &CancellationToken,
    ) -> Result<Arc<Endpoint>, ConnectionError> {
        let slot = self.slot(role);
        let _guard = slot
            .connect_guard
            .try_lock()
            .map_err(|_| ConnectionError::InProgress(role))?;
        let generation = slot.state.read().generation;

        let previous = slot.state.write().endpoint.take();
        if let Some(previous) = previous {
            self.logs.info(format!(
                "Closing existing {} connection to {} before reconnecting",
                role, previous.address
            ));
            self.close(&previous).await;
            self.transition(role, ConnectionStatus::Disconnected, None);
        }

        self.transition(role, ConnectionStatus::Connecting, None);
        self.logs.info(format!(
            "Connecting to {} endpoint {} as {}",
            role, address, username
        ));

        let params = connect_params(address, username, &password);
        let result = self.pool.execute(scripts::CONNECT, params, cancel).await;

        let torn_down = {
            let mut state = slot.state.write();
            let torn_down = state.generation != generation;
            match &result {
                Ok(_) if torn_down => {
                    state.last_error = Some(ConnectionError::Aborted(role).to_string())
                }
                Ok(_) => state.last_error = None,
                Err(e) => state.last_error = Some(e.to_string()),
            }
            torn_down
        };

        match result {
            Ok(banner) if torn_down => {
                let endpoint = Endpoint::new(role, address, username, password, banner);
                self.logs.info(format!(
                    "Disconnect requested while connecting {} endpoint {}; closing it",
                    role, address
                ));
                self.transition(role, ConnectionStatus::Failed, None);
                self.close(&endpoint).await;
                self.transition(role, ConnectionStatus::Disconnected, None);
                Err(ConnectionError::Aborted(role))
            }
            Ok(banner) => {
                let endpoint = Arc::new(Endpoint::new(role, address, username, password, banner));
                slot.state.write().endpoint = Some(Arc::clone(&endpoint));
                self.transition(role, ConnectionStatus::Connected, None);
                Ok(endpoint)
            }
            Err(e) => {
                self.transition(role, ConnectionStatus::Failed, Some(&e));
                if torn_down {
                    self.transition(role, ConnectionStatus::Disconnected, None);
                }
                Err(ConnectionError::Failed {
                    role,
                    address: address.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Version of the connected endpoint for `role`.
    ///
    /// Looked up once per endpoint through the version script; the last
    /// non-empty output line is the version.
    pub async fn get_version(
        &self,
        role: EndpointRole,
        cancel: &CancellationToken,
    ) -> Result<String, ConnectionError> {
        let endpoint = self.require(role)?;
        let version = endpoint
            .version
            .get_or_try_init(|| async {
                let output = self
                    .pool
                    .execute(scripts::GET_VERSION, endpoint.script_params(), cancel)
                    .await?;
                parse_version(&output)
            })
            .await
            .map_err(|source| ConnectionError::VersionLookup { role, source })?;

        tracing::debug!("{} endpoint version: {}", role, version);
        Ok(version.clone())
    }

    /// Tear down the endpoint for `role`. Idempotent.
    ///
    /// The disconnect script is best effort: its failure is logged and the
    /// endpoint is dropped anyway. A connect attempt still in flight is not
    /// interrupted; it closes its endpoint and ends disconnected.
    pub async fn disconnect(&self, role: EndpointRole) {
        let (endpoint, status) = {
            let mut state = self.slot(role).state.write();
            state.generation += 1;
            (state.endpoint.take(), state.status)
        };

        if let Some(endpoint) = endpoint {
            self.close(&endpoint).await;
        }

        match status {
            ConnectionStatus::Connected | ConnectionStatus::Failed => {
                self.transition(role, ConnectionStatus::Disconnected, None);
            }
            ConnectionStatus::Connecting => {
                self.logs.info(format!(
                    "{} endpoint: connect in flight, it will be closed when it returns",
                    role
                ));
            }
            ConnectionStatus::Disconnected => {}
        }
    }

    /// Tear down both endpoints. Idempotent.
    pub async fn disconnect_all(&self) {
        futures::future::join_all(EndpointRole::ALL.iter().map(|role| self.disconnect(*role)))
            .await;
    }

    /// Current status of `role`
    pub fn status(&self, role: EndpointRole) -> ConnectionStatus {
        self.slot(role).state.read().status
    }

    /// Live endpoint for `role`, if connected
    pub fn endpoint(&self, role: EndpointRole) -> Option<Arc<Endpoint>> {
        self.slot(role).state.read().endpoint.clone()
    }

    /// Live endpoint for `role`, or [`ConnectionError::NotConnected`]
    pub fn require(&self, role: EndpointRole) -> Result<Arc<Endpoint>, ConnectionError> {
        self.endpoint(role)
            .ok_or(ConnectionError::NotConnected(role))
    }

    /// Whether `role` has a live endpoint
    pub fn is_connected(&self, role: EndpointRole) -> bool {
        self.slot(role).state.read().endpoint.is_some()
    }

    /// Number of roles with a live endpoint
    pub fn live_endpoints(&self) -> usize {
        EndpointRole::ALL
            .iter()
            .filter(|role| self.is_connected(**role))
            .count()
    }

    /// Front-end view of `role`
    pub fn connection_result(&self, role: EndpointRole) -> ConnectionResult {
        let state = self.slot(role).state.read();
        ConnectionResult {
            connected: state.endpoint.is_some(),
            version: state
                .endpoint
                .as_ref()
                .and_then(|e| e.cached_version().map(str::to_string)),
            error: state.last_error.clone(),
        }
    }

    /// Shared script pool
    pub fn pool(&self) -> &Arc<ScriptSessionPool> {
        &self.pool
    }

    async fn close(&self, endpoint: &Endpoint) {
        // Teardown must run even when the caller's run was cancelled
        let cancel = CancellationToken::new();
        if let Err(e) = self
            .pool
            .execute(scripts::DISCONNECT, endpoint.script_params(), &cancel)
            .await
        {
            self.logs.warn(format!(
                "Disconnect script for {} endpoint {} failed: {}",
                endpoint.role, endpoint.address, e
            ));
        }
    }

    fn transition(&self, role: EndpointRole, next: ConnectionStatus, error: Option<&ScriptError>) {
        let previous = {
            let mut state = self.slot(role).state.write();
            let previous = state.status;
            if previous == next {
                return;
            }
            state.status = next;
            previous
        };

        if !previous.can_transition_to(next) {
            tracing::warn!("Unexpected {} transition {} -> {}", role, previous, next);
        }

        let (level, message) = match (next, error) {
            (ConnectionStatus::Failed, Some(e)) if e.is_cancelled() => (
                LogLevel::Info,
                format!("{} endpoint: connect cancelled", role),
            ),
            (ConnectionStatus::Failed, Some(e)) => (
                LogLevel::Error,
                format!("{} endpoint: {} -> {}: {}", role, previous, next, e),
            ),
            _ => (
                LogLevel::Info,
                format!("{} endpoint: {} -> {}", role, previous, next),
            ),
        };
        self.logs.emit(level, message);
    }
}

impl std::fmt::Debug for EndpointConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConnectionManager")
            .field("source", &self.status(EndpointRole::Source))
            .field("destination", &self.status(EndpointRole::Destination))
            .finish()
    }
}

fn parse_version(output: &str) -> Result<String, ScriptError> {
    output
        .lines()
        .map(str::trim)
        .rev()
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ScriptError::Execution {
            script: scripts::GET_VERSION.to_string(),
            message: "no version reported".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{SimulatedRuntime, SIMULATED_VERSION};
    use parking_lot::Mutex as SyncMutex;

    fn simulated_manager() -> (EndpointConnectionManager, Arc<LogObservers>) {
        let logs = Arc::new(LogObservers::new());
        let pool = ScriptSessionPool::with_runtime(
            2,
            Arc::new(SimulatedRuntime::new()),
            Arc::clone(&logs),
        );
        for name in scripts::all() {
            pool.register_script(name, format!("/scripts/{}.ps1", name));
        }
        (
            EndpointConnectionManager::new(Arc::new(pool), Arc::clone(&logs)),
            logs,
        )
    }

    #[test]
    fn test_parse_version_takes_last_line() {
        assert_eq!(parse_version("PowerCLI 13\n\n 8.0.2 \n\n").unwrap(), "8.0.2");
        assert!(parse_version("  \n").is_err());
    }

    #[tokio::test]
    async fn test_connect_and_version() {
        let (manager, _) = simulated_manager();
        let cancel = CancellationToken::new();

        assert_eq!(manager.status(EndpointRole::Source), ConnectionStatus::Disconnected);
        let endpoint = manager
            .connect(EndpointRole::Source, "vc01", "admin", Secret::new("pw"), &cancel)
            .await
            .unwrap();
        assert!(endpoint.banner.contains("vc01"));
        assert_eq!(manager.status(EndpointRole::Source), ConnectionStatus::Connected);
        assert_eq!(manager.status(EndpointRole::Destination), ConnectionStatus::Disconnected);

        assert_eq!(manager.connection_result(EndpointRole::Source).version, None);
        let version = manager.get_version(EndpointRole::Source, &cancel).await.unwrap();
        assert_eq!(version, SIMULATED_VERSION);
        assert_eq!(
            manager.connection_result(EndpointRole::Source).version.as_deref(),
            Some(SIMULATED_VERSION)
        );
    }

    #[tokio::test]
    async fn test_version_requires_connection() {
        let (manager, _) = simulated_manager();
        let err = manager
            .get_version(EndpointRole::Destination, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::NotConnected(EndpointRole::Destination)));
    }

    #[tokio::test]
    async fn test_transitions_are_logged() {
        let (manager, logs) = simulated_manager();
        let lines = Arc::new(SyncMutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        logs.subscribe(move |msg, _| sink.lock().push(msg.to_string()));

        let cancel = CancellationToken::new();
        manager
            .connect(EndpointRole::Destination, "vc02", "admin", Secret::new("pw"), &cancel)
            .await
            .unwrap();
        manager.disconnect_all().await;
        manager.disconnect_all().await;

        let lines = lines.lock();
        let transitions: Vec<_> = lines
            .iter()
            .filter(|l| l.starts_with("destination endpoint:"))
            .cloned()
            .collect();
        assert_eq!(
            transitions,
            vec![
                "destination endpoint: disconnected -> connecting",
                "destination endpoint: connecting -> connected",
                "destination endpoint: connected -> disconnected",
            ]
        );
        assert_eq!(manager.live_endpoints(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_connect_fails_without_endpoint() {
        let (manager, _) = simulated_manager();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = manager
            .connect(EndpointRole::Source, "vc01", "admin", Secret::new("pw"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.role(), EndpointRole::Source);
        assert_eq!(manager.status(EndpointRole::Source), ConnectionStatus::Failed);
        assert!(manager.endpoint(EndpointRole::Source).is_none());
        assert!(manager.connection_result(EndpointRole::Source).error.is_some());
    }
}
