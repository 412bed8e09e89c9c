// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use crate::record::IdentifiedRecord;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backing store inaccessible (quota, I/O, closed pool, ...)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Data corruption detected for '{id}': expected hash {expected}, got {actual}")]
    Corruption {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Durable keyed storage of identification records.
///
/// `put` and `delete` must be atomic with respect to each other: readers never
/// observe a partially written record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace by id. `synced` never goes back to `false`: an
    /// upsert carrying `synced = false` over a synced record keeps it synced.
    async fn put(&self, record: &IdentifiedRecord) -> Result<(), StorageError>;

    async fn get(&self, id: &str) -> Result<Option<IdentifiedRecord>, StorageError>;

    /// All records, newest `created_at` first.
    async fn list_all(&self) -> Result<Vec<IdentifiedRecord>, StorageError>;

    /// Records not yet accepted by the remote side. Order unspecified.
    async fn list_unsynced(&self) -> Result<Vec<IdentifiedRecord>, StorageError>;

    /// Remove a record. Missing ids are not an error.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;

    /// Flip `synced` on an existing record.
    ///
    /// Returns `false` if the record no longer exists.
    /// Default implementation is a read-modify-write through `get` + `put`.
    async fn mark_synced(&self, id: &str) -> Result<bool, StorageError> {
        match self.get(id).await? {
            Some(record) if record.synced => Ok(true),
            Some(record) => {
                self.put(&record.into_synced()).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_unsynced(&self) -> Result<usize, StorageError> {
        Ok(self.list_unsynced().await?.len())
    }

    /// Release backing resources. Subsequent calls may fail with
    /// [`StorageError::Unavailable`].
    async fn close(&self) {}
}
