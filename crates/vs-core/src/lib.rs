//! vs-core: Core abstractions and configuration for vmshift
//!
//! This crate provides shared types, errors, traits and configuration
//! structures used by the orchestration engine and the CLI.

pub mod config;
pub mod error;
pub mod observer;
pub mod scripts;
pub mod time;
pub mod traits;
pub mod types;

pub use error::VsError;
pub use observer::{LogLevel, LogObservers};
pub use types::{BackupKind, EndpointRole, ObjectType, ScriptParams, Secret, TaskId};
