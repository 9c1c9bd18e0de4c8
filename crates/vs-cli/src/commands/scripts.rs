//! Scripts command implementation

use anyhow::Result;

use vs_orchestrator::OrchestratorState;

use crate::output::{format_scripts, print_info, print_warning};

/// List the script registry, optionally probing the toolkit first
pub async fn scripts_command(state: &OrchestratorState, probe: bool) -> Result<()> {
    if probe {
        let mode = state.initialize().await;
        print_info(&format!("Execution mode: {}", mode));
    }

    let scripts = state.pool.registered_scripts();
    println!("{}", format_scripts(&scripts));

    let missing = scripts.iter().filter(|(_, path)| !path.is_file()).count();
    if missing > 0 {
        print_warning(&format!(
            "{} of {} script file(s) not found under the configured paths",
            missing,
            scripts.len()
        ));
    }

    let stats = state.pool.stats();
    print_info(&format!(
        "Toolkit: {} (pool capacity {})",
        state.config.toolkit.program, stats.capacity
    ));
    Ok(())
}
