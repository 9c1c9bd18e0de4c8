//! Script registration table

use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// Maps logical script names to filesystem paths
pub struct ScriptRegistry {
    scripts: DashMap<String, PathBuf>,
}

impl ScriptRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            scripts: DashMap::new(),
        }
    }

    /// Register or replace the path for `name`.
    ///
    /// Returns the previous path, if any.
    pub fn register(&self, name: impl Into<String>, path: impl AsRef<Path>) -> Option<PathBuf> {
        self.scripts.insert(name.into(), path.as_ref().to_path_buf())
    }

    /// Resolve a logical name
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.scripts.get(name).map(|r| r.value().clone())
    }

    /// Whether `name` has a registration
    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    /// Names from `required` that have no registration, in input order
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|name| !self.contains(name))
            .collect()
    }

    /// All registrations sorted by name
    pub fn list(&self) -> Vec<(String, PathBuf)> {
        let mut entries: Vec<_> = self
            .scripts
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of registered scripts
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        Self::new()
    }
}
