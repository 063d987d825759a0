use std::path::PathBuf;

use crate::error::HostError;
use crate::persist::PersistedState;

const STATE_EXT: &str = "state.json";

/// Disk-backed saved state, one file per host key.
///
/// Layout under `base_dir`:
/// ```text
/// {base_dir}/
///   {host_key}.state.json   - PersistedState for that host
/// ```
pub struct SavedStateStore {
    base_dir: PathBuf,
}

impl SavedStateStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Default location: ~/.lodge/state/
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lodge")
            .join("state")
    }

    pub fn base_dir(&self) -> &std::path::Path {
        &self.base_dir
    }

    pub async fn init(&self) -> Result<(), HostError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    fn path_for(&self, host_key: &str) -> Result<PathBuf, HostError> {
        if host_key.is_empty() || host_key.starts_with('.') || host_key.contains(['/', '\\']) {
            return Err(HostError::Config(format!("invalid host key {host_key:?}")));
        }
        Ok(self.base_dir.join(format!("{host_key}.{STATE_EXT}")))
    }

    /// Write `state` for `host_key`, replacing any previous file atomically.
    pub async fn save(&self, host_key: &str, state: &PersistedState) -> Result<PathBuf, HostError> {
        let path = self.path_for(host_key)?;
        self.init().await?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::info!(host_key, entries = state.len(), path = %path.display(), "Saved state written");
        Ok(path)
    }

    /// Saved state for `host_key`, or `None` if nothing was saved.
    pub async fn load(&self, host_key: &str) -> Result<Option<PersistedState>, HostError> {
        let path = self.path_for(host_key)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: PersistedState = serde_json::from_str(&content)?;
        tracing::debug!(host_key, entries = state.len(), "Saved state loaded");
        Ok(Some(state))
    }

    /// Delete the saved state for `host_key`. Returns whether a file existed.
    pub async fn remove(&self, host_key: &str) -> Result<bool, HostError> {
        let path = self.path_for(host_key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Host keys with saved state on disk, sorted.
    pub async fn list_host_keys(&self) -> Result<Vec<String>, HostError> {
        let mut keys = Vec::new();
        if !self.base_dir.exists() {
            return Ok(keys);
        }
        let mut entries = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(key) = name.strip_suffix(&format!(".{STATE_EXT}")) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
