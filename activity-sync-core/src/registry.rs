//! Keyed cache of server-confirmed records.

use std::collections::HashMap;

use crate::error::{StoreError, StoreResult};
use crate::models::Record;

/// In-memory map from record id to the last server-confirmed copy.
///
/// Iteration order is unspecified; use [`crate::projection`] for ordered
/// views. Every successful mutation bumps [`EntityRegistry::version`].
#[derive(Debug, Clone)]
pub struct EntityRegistry<R> {
    records: HashMap<String, R>,
    version: u64,
}

impl<R: Record> Default for EntityRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> EntityRegistry<R> {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            version: 0,
        }
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Inserts or replaces the record stored under `id`.
    pub fn set(&mut self, id: &str, record: R) -> StoreResult<()> {
        if id.is_empty() {
            return Err(StoreError::InvalidRecord("empty id".to_string()));
        }
        self.records.insert(id.to_string(), record);
        self.version += 1;
        Ok(())
    }

    /// Removes `id`, returning the record that was stored under it.
    pub fn remove(&mut self, id: &str) -> StoreResult<Option<R>> {
        if id.is_empty() {
            return Err(StoreError::InvalidRecord("empty id".to_string()));
        }
        let removed = self.records.remove(id);
        if removed.is_some() {
            self.version += 1;
        }
        Ok(removed)
    }

    /// Snapshot of all records, in no particular order.
    pub fn values(&self) -> Vec<R> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
