//! vmshift: command-line front end for the orchestration engine
//!
//! Wires configuration, credentials and console output around the
//! orchestrator services.

pub mod commands;
pub mod credentials;
pub mod output;
