// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use crate::record::IdentifiedRecord;
use super::traits::{RecordStore, StorageError};

/// Non-durable store for tests and hosts without a filesystem.
pub struct InMemoryRecordStore {
    data: DashMap<String, IdentifiedRecord>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn sort_newest_first(records: &mut [IdentifiedRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, record: &IdentifiedRecord) -> Result<(), StorageError> {
        self.data
            .entry(record.id.clone())
            .and_modify(|existing| {
                let synced = existing.synced || record.synced;
                *existing = record.clone();
                existing.synced = synced;
            })
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<IdentifiedRecord>, StorageError> {
        Ok(self.data.get(id).map(|r| r.value().clone()))
    }

    async fn list_all(&self) -> Result<Vec<IdentifiedRecord>, StorageError> {
        let mut records: Vec<IdentifiedRecord> =
            self.data.iter().map(|r| r.value().clone()).collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn list_unsynced(&self) -> Result<Vec<IdentifiedRecord>, StorageError> {
        Ok(self
            .data
            .iter()
            .filter(|r| !r.value().synced)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.data.remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.data.clear();
        Ok(())
    }

    async fn mark_synced(&self, id: &str) -> Result<bool, StorageError> {
        Ok(match self.data.get_mut(id) {
            Some(mut entry) => {
                entry.synced = true;
                true
            }
            None => false,
        })
    }
}
