use std::collections::BTreeMap;

use lodge_core::StateBlob;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::HostError;

/// One id's freeze state as stored inside the host's saved-state container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEntry {
    /// Hex-encoded blob bytes.
    pub data: String,
    /// SHA-256 hex of the raw bytes.
    pub sha256: String,
}

impl SealedEntry {
    pub fn seal(blob: &StateBlob) -> Self {
        Self {
            data: hex::encode(blob.as_bytes()),
            sha256: hex::encode(Sha256::digest(blob.as_bytes())),
        }
    }
}

/// Per-id freeze states, keyed by component id.
///
/// Entries are kept as raw JSON so that one corrupt entry can be rejected
/// on open without failing to parse the whole container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedState {
    entries: BTreeMap<String, serde_json::Value>,
}

impl PersistedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal `blob` and store it under `id`.
    pub fn insert(&mut self, id: impl Into<String>, blob: &StateBlob) {
        // Serializing a struct of strings cannot fail.
        let value = serde_json::to_value(SealedEntry::seal(blob)).unwrap_or_default();
        self.entries.insert(id.into(), value);
    }

    /// Store an entry verbatim, without sealing.
    pub fn insert_raw(&mut self, id: impl Into<String>, value: serde_json::Value) {
        self.entries.insert(id.into(), value);
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Verify and decode the entry for `id`. `Ok(None)` if there is none.
    pub fn open(&self, id: &str) -> Result<Option<StateBlob>, HostError> {
        self.entries
            .get(id)
            .map(|value| open_entry(id, value))
            .transpose()
    }

    /// Every entry in id order, each opened independently.
    pub fn iter_open(&self) -> impl Iterator<Item = (&str, Result<StateBlob, HostError>)> {
        self.entries
            .iter()
            .map(|(id, value)| (id.as_str(), open_entry(id, value)))
    }
}

fn open_entry(id: &str, value: &serde_json::Value) -> Result<StateBlob, HostError> {
    let malformed = |reason: String| HostError::MalformedPersistedEntry {
        id: id.to_string(),
        reason,
    };
    let sealed: SealedEntry =
        serde_json::from_value(value.clone()).map_err(|e| malformed(format!("not a sealed entry: {e}")))?;
    let bytes = hex::decode(&sealed.data).map_err(|e| malformed(format!("bad hex data: {e}")))?;
    let digest = hex::encode(Sha256::digest(&bytes));
    if !digest.eq_ignore_ascii_case(&sealed.sha256) {
        return Err(malformed(format!(
            "digest mismatch: expected {}, got {digest}",
            sealed.sha256
        )));
    }
    Ok(StateBlob::new(bytes))
}
