//! Last-applied state of managed resources
//!
//! The store is the durable half of the `key -> remote_id` mapping. The
//! engine reads remembered ids from it and writes records back only for keys
//! that converged.

use std::collections::BTreeMap;

use crate::types::ResourceRecord;

/// Key-value store of last-known resource records
pub trait StateStore {
    fn get(&self, key: &str) -> Option<&ResourceRecord>;

    /// All records, ordered by key
    fn records(&self) -> Vec<&ResourceRecord>;

    /// Insert or replace the record for `record.key`
    fn save(&mut self, record: ResourceRecord);

    /// Drop the record for `key`, returning it if present
    fn forget(&mut self, key: &str) -> Option<ResourceRecord>;
}

/// In-memory [`StateStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, ResourceRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl StateStore for MemoryStore {
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
