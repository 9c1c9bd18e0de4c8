//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use vs_core::config::{self, AppConfig};

fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

/// Print the config file path
pub fn config_path(config_path: Option<&Path>) {
    println!("{}", resolve_path(config_path).display());
}

/// Show current configuration
///
/// Without a config file the built-in defaults are printed instead.
pub fn config_show(config_path: Option<&Path>) -> Result<()> {
    let path = resolve_path(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'vmshift config init' to create one. Built-in defaults:");
        println!();
        println!(
            "{}",
            toml::to_string_pretty(&AppConfig::default())
                .context("Failed to render default configuration")?
        );
        return Ok(());
    }

    let loaded: AppConfig = config::load_config(&path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;

    print_info(&format!("Configuration file: {:?}", path));
    println!();
    println!(
        "{}",
        toml::to_string_pretty(&loaded).context("Failed to render configuration")?
    );

    Ok(())
}

/// Initialize default configuration
pub fn config_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let config_file = resolve_path(config_path);

    if let Some(config_dir) = config_file.parent() {
        if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
            std::fs::create_dir_all(config_dir)
                .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
            print_success(&format!("Created config directory: {:?}", config_dir));
        }
    }

    if config_file.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", config_file));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    std::fs::write(&config_file, generate_default_config())
        .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

    print_success(&format!("Created configuration file: {:?}", config_file));
    print_info("Passwords are read from VMSHIFT_SOURCE_PASSWORD and VMSHIFT_DESTINATION_PASSWORD");

    Ok(())
}

/// Generate default configuration content
fn generate_default_config() -> String {
    r#"# vmshift configuration

[toolkit]
# Executable hosting the automation scripts
program = "pwsh"
script_args = ["-NoLogo", "-NoProfile", "-NonInteractive", "-File"]

# Seconds the availability probe may take before falling back to simulation
probe_timeout = 30

# Seconds for connect and backup calls
default_timeout = 1800

# Concurrent script sessions
pool_capacity = 4

# Directory with the default script files (<Name>.ps1)
script_dir = "scripts"

[migration]
max_concurrent_migrations = 2
timeout_minutes = 60
retry_attempts = 2
retry_delay_minutes = 5
create_snapshot = false
snapshot_name = "pre-migration"
validate_after_migration = true
remove_source_after_migration = false
preserve_network_settings = true
power_on_after_migration = false

[backup]
default_kinds = [
    "switch-config",
    "users-groups",
    "roles",
    "permissions",
    "host-config",
    "vm-config",
    "cluster-config",
    "resource-pools",
    "folders",
]

# Per-script path overrides
# [scripts]
# Move-VirtualMachine = "/opt/vmshift/custom/Move-VirtualMachine.ps1"

# Saved endpoints
# [profiles.source-lab]
# address = "vc-old.example.com"
# username = "administrator@vsphere.local"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_template_parses() {
        let parsed: AppConfig = toml::from_str(&generate_default_config()).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(parsed.toolkit.program, defaults.toolkit.program);
        assert_eq!(parsed.toolkit.pool_capacity, defaults.toolkit.pool_capacity);
        assert_eq!(parsed.migration, defaults.migration);
        assert_eq!(parsed.backup.default_kinds, defaults.backup.default_kinds);
        assert!(parsed.profiles.is_empty());
    }

    #[test]
    fn test_init_respects_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        config_init(Some(&path), false).unwrap();
        assert!(path.exists());

        std::fs::write(&path, "# edited").unwrap();
        config_init(Some(&path), false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited");

        config_init(Some(&path), true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[toolkit]"));
    }
}
