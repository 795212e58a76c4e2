//! Runtime configuration
//!
//! The handful of keys the core reads: where the cache lives, where
//! workflow specs and custom agents are found, the execution policy, and
//! whether host extensions are honored. Loaded from YAML with serde
//! defaults for every field; `AGENTMAP_CACHE_DIR` overrides the cache
//! directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use agentmap_core::PolicyConfig;

use crate::error::Result;

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "AGENTMAP_CACHE_DIR";

/// Configuration for one runtime instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Root for bundles, registries and interaction records
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Directory holding workflow spec files
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: PathBuf,

    /// Directory scanned for user agent types at bootstrap
    #[serde(default)]
    pub custom_agents_path: Option<PathBuf>,

    #[serde(default)]
    pub execution_policy: PolicyConfig,

    /// Whether host-extension service registrations are honored
    #[serde(default)]
    pub host_extensions_enabled: bool,

    /// Unknown agent types tolerated before bundle creation fails
    #[serde(default)]
    pub max_missing_declarations: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            workflows_dir: default_workflows_dir(),
            custom_agents_path: None,
            execution_policy: PolicyConfig::default(),
            host_extensions_enabled: false,
            max_missing_declarations: 0,
        }
    }
}

impl RuntimeConfig {
    /// Load from a YAML file, applying the environment override
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let mut config: RuntimeConfig = serde_yaml::from_slice(&bytes)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from a file when given, otherwise defaults plus env overrides
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(path) => RuntimeConfig::load(path).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                let mut config = RuntimeConfig::default();
                config.apply_env_overrides();
                config
            }),
            None => {
                let mut config = RuntimeConfig::default();
                config.apply_env_overrides();
                config
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            if !dir.is_empty() {
                debug!(dir = %dir, "cache directory overridden from environment");
                self.cache_dir = PathBuf::from(dir);
            }
        }
    }

    pub fn availability_cache_path(&self) -> PathBuf {
        self.cache_dir.join("availability_cache.json")
    }

    pub fn bundle_registry_path(&self) -> PathBuf {
        self.cache_dir.join("graph_registry.json")
    }

    pub fn collections_dir(&self) -> PathBuf {
        self.cache_dir.join("collections")
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("agentmap"))
        .unwrap_or_else(|| PathBuf::from(".agentmap_cache"))
}

fn default_workflows_dir() -> PathBuf {
    PathBuf::from("workflows")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.workflows_dir, PathBuf::from("workflows"));
        assert_eq!(config.max_missing_declarations, 0);
        assert!(!config.host_extensions_enabled);
        assert!(config
            .availability_cache_path()
            .ends_with("availability_cache.json"));
    }

    #[test]
    fn test_load_partial_yaml_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"cache_dir: /tmp/agentmap-test-cache\nmax_missing_declarations: 2\n")
            .unwrap();
        file.flush().unwrap();

        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/agentmap-test-cache"));
        assert_eq!(config.max_missing_declarations, 2);
        assert_eq!(config.workflows_dir, PathBuf::from("workflows"));
        assert_eq!(config.execution_policy.policy_type, "all_nodes");
    }

    #[test]
    fn test_load_or_default_with_missing_file() {
        let config = RuntimeConfig::load_or_default(Some(Path::new("/no/such/config.yaml")));
        assert_eq!(config.workflows_dir, PathBuf::from("workflows"));
    }
}
