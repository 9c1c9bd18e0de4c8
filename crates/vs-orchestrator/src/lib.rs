//! vs-orchestrator: orchestration engine for vmshift
//!
//! Drives an external automation toolkit to back up and migrate objects
//! between two virtualization management endpoints. The engine owns the
//! script session pool, the endpoint connection lifecycle, the sequential
//! backup pipeline and the bounded-concurrency migration scheduler.

pub mod backup;
pub mod connection;
pub mod migration;
pub mod script;
pub mod state;

pub use backup::{BackupError, BackupOrchestrator, BackupOutcome, BackupSummary};
pub use connection::{Endpoint, EndpointConnectionManager};
pub use migration::{MigrationError, MigrationOrchestrator, MigrationReport, MigrationTask};
pub use script::{PoolStats, ScriptSessionPool};
pub use state::OrchestratorState;
