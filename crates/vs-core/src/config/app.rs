//! Top-level application configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{ConnectionProfile, MigrationSettings, ToolkitConfig};
use crate::scripts;
use crate::types::BackupKind;

/// Backup defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Kinds run when the caller does not select any
    pub default_kinds: Vec<BackupKind>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            default_kinds: BackupKind::ALL.to_vec(),
        }
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Toolkit and session pool settings
    pub toolkit: ToolkitConfig,

    /// Logical script name -> path overrides
    pub scripts: BTreeMap<String, PathBuf>,

    /// Default migration policy
    pub migration: MigrationSettings,

    /// Backup defaults
    pub backup: BackupConfig,

    /// Saved endpoint profiles
    pub profiles: BTreeMap<String, ConnectionProfile>,
}

impl AppConfig {
    /// Full registration table: defaults under `toolkit.script_dir`, then
    /// overrides from `[scripts]`. Relative override paths are kept as-is.
    pub fn script_table(&self) -> BTreeMap<String, PathBuf> {
        let mut table: BTreeMap<String, PathBuf> = scripts::all()
            .into_iter()
            .map(|name| {
                (
                    name.to_string(),
                    self.toolkit.script_dir.join(scripts::default_file_name(name)),
                )
            })
            .collect();
        for (name, path) in &self.scripts {
            table.insert(name.clone(), path.clone());
        }
        table
    }

    /// Look up a profile by name, filling in `name` from the table key
    pub fn profile(&self, name: &str) -> Option<ConnectionProfile> {
        self.profiles.get(name).map(|p| {
            let mut profile = p.clone();
            if profile.name.is_empty() {
                profile.name = name.to_string();
            }
            profile
        })
    }
}
