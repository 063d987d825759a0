use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::HostError;
use crate::storage::SavedStateStore;

/// Platform version reported when the config does not pin one.
pub const DEFAULT_RUNTIME_VERSION: u32 = 34;

#[derive(Debug, Default, Deserialize)]
pub struct LodgeConfig {
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    #[serde(default = "default_single_resume")]
    pub single_resume: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            single_resume: default_single_resume(),
        }
    }
}

fn default_single_resume() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    pub version: Option<u32>,
}

impl RuntimeConfig {
    pub fn version(&self) -> u32 {
        self.version.unwrap_or(DEFAULT_RUNTIME_VERSION)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub dir: Option<PathBuf>,
    #[serde(default = "default_host_key")]
    pub host_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            host_key: default_host_key(),
        }
    }
}

fn default_host_key() -> String {
    "host".into()
}

impl StorageConfig {
    /// `LODGE_STATE_DIR` wins over `dir`, which wins over `~/.lodge/state`.
    pub fn state_dir(&self) -> PathBuf {
        std::env::var_os("LODGE_STATE_DIR")
            .map(PathBuf::from)
            .or_else(|| self.dir.clone())
            .unwrap_or_else(SavedStateStore::default_path)
    }
}

impl LodgeConfig {
    pub fn from_file(path: &Path) -> Result<Self, HostError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, HostError> {
        toml::from_str(content).map_err(|e| HostError::Config(format!("Failed to parse config: {e}")))
    }
}
