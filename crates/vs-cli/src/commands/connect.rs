//! Connect command implementation
//!
//! Connects the given endpoints, queries their versions and reports the
//! result. The caller disconnects on shutdown.

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;

use vs_core::traits::CredentialProvider;
use vs_core::types::EndpointRole;
use vs_orchestrator::OrchestratorState;

use super::{connect_profile, resolve_endpoint};
use crate::output::{format_connections, print_info, print_success, print_warning};

/// Test connectivity to the source and/or destination endpoint
pub async fn connect_command(
    state: &OrchestratorState,
    source: Option<&str>,
    destination: Option<&str>,
    credentials: &dyn CredentialProvider,
    cancel: &CancellationToken,
) -> Result<()> {
    let targets: Vec<(EndpointRole, &str)> = [
        (EndpointRole::Source, source),
        (EndpointRole::Destination, destination),
    ]
    .into_iter()
    .filter_map(|(role, spec)| spec.map(|s| (role, s)))
    .collect();
    if targets.is_empty() {
        bail!("Nothing to connect: pass --source and/or --destination");
    }

    let mode = state.initialize().await;
    print_info(&format!("Execution mode: {}", mode));

    let mut results = Vec::with_capacity(targets.len());
    let mut failures = 0usize;
    for (role, spec) in targets {
        let profile = resolve_endpoint(&state.config, spec)?;
        let connected = connect_profile(state, role, &profile, credentials, cancel).await;
        if connected.is_ok() {
            if let Err(e) = state.connections.get_version(role, cancel).await {
                print_warning(&format!("Connected, but {}", e));
            }
        }

        let mut result = state.connections.connection_result(role);
        if let Err(e) = connected {
            failures += 1;
            // Credential lookup fails before the manager records anything
            if result.error.is_none() {
                result.error = Some(format!("{:#}", e));
            }
        }
        results.push((role, profile.address.clone(), result));
    }

    println!("{}", format_connections(&results));

    if failures > 0 {
        bail!("{} endpoint(s) could not be connected", failures);
    }
    print_success("All endpoints connected");
    Ok(())
}
