use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconcile::{ResourceRecord, StateStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// ============================================================================
// State Structures
// ============================================================================

/// Last-applied `key -> remote id` records, persisted as TOML
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SyncState {
    /// Last time the state was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// One record per managed key
    #[serde(default)]
    pub records: BTreeMap<String, ResourceRecord>,
}

impl SyncState {
    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file {} does not exist, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded {} records from {}", state.records.len(), path.display());
        Ok(state)
    }

    /// Stamp and write state to disk
    pub fn persist(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.last_updated = Some(Utc::now());
        let content = toml::to_string_pretty(&*self).context("Failed to serialize state to TOML")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved {} records to {}", self.records.len(), path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl StateStore for SyncState {
    fn get(&self, key: &str) -> Option<&ResourceRecord> {
        self.records.get(key)
    }

    fn records(&self) -> Vec<&ResourceRecord> {
        self.records.values().collect()
    }

    fn save(&mut self, record: ResourceRecord) {
        self.records.insert(record.key.clone(), record);
    }

    fn forget(&mut self, key: &str) -> Option<ResourceRecord> {
        self.records.remove(key)
    }
}
