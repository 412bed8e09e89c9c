// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite record store.
//!
//! One table, keyed by record id, with secondary indexes for the two read
//! paths (recency and sync state):
//!
//! ```sql
//! CREATE TABLE identified_records (
//!   id TEXT PRIMARY KEY,
//!   reference_id TEXT,
//!   display_name TEXT NOT NULL,
//!   scientific_name TEXT NOT NULL,
//!   confidence REAL NOT NULL,
//!   image_payload BLOB NOT NULL,   -- UTF-8, or zstd when compressed
//!   payload_hash TEXT NOT NULL,    -- SHA-256 of the uncompressed payload
//!   created_at INTEGER NOT NULL,
//!   synced INTEGER NOT NULL DEFAULT 0
//! )
//! ```
//!
//! The upsert keeps `synced = MAX(old, new)` so a stale writer can never
//! move a record back to unsynced.
//!
//! Payload hashes are verified on every read. `get` fails hard with
//! [`StorageError::Corruption`]; the list reads skip (and log) corrupted rows
//! so one bad record cannot block the others. `count_unsynced` counts rows
//! as stored, corrupted ones included.

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::compression::{decode_payload, encode_payload};
use crate::record::{payload_digest, IdentifiedRecord};
use crate::resilience::retry::{retry, RetryConfig};
use super::traits::{RecordStore, StorageError};

const SELECT_COLUMNS: &str = "id, reference_id, display_name, scientific_name, confidence, \
                              image_payload, payload_hash, created_at, synced";

pub struct SqliteRecordStore {
    pool: SqlitePool,
    path: String,
    compress_payloads: bool,
}

fn unavailable(e: sqlx::Error) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

fn decode_error(e: sqlx::Error) -> StorageError {
    StorageError::Serialization(e.to_string())
}

impl SqliteRecordStore {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with(path, false).await
    }

    /// Open with payload compression on or off. Compression only takes
    /// effect with the `compression` feature; existing rows are read either way.
    pub async fn open_with(
        path: impl AsRef<Path>,
        compress_payloads: bool,
    ) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        info!(path = %path_str, compress_payloads, "Opening record store");

        // WAL: readers don't block the writer, single fsync per commit
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = retry("sqlite_open", &RetryConfig::startup(), || async {
            SqlitePoolOptions::new()
                .max_connections(4)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options.clone())
                .await
                .map_err(unavailable)
        })
        .await?;

        let store = Self {
            pool,
            path: path_str,
            compress_payloads,
        };
        store.init_schema().await?;

        let pending = store.count_unsynced().await.unwrap_or(0);
        if pending > 0 {
            info!(pending, "Record store has unsynced records from a previous run");
        }

        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS identified_records (
                id TEXT PRIMARY KEY,
                reference_id TEXT,
                display_name TEXT NOT NULL,
                scientific_name TEXT NOT NULL,
                confidence REAL NOT NULL,
                image_payload BLOB NOT NULL,
                payload_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_records_created_at ON identified_records (created_at)",
            "CREATE INDEX IF NOT EXISTS idx_records_synced ON identified_records (synced)",
        ];

        for sql in statements {
            retry("sqlite_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql)
                    .execute(&self.pool)
                    .await
                    .map_err(unavailable)
            })
            .await?;
        }

        Ok(())
    }

    /// Path of the database file.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn record_from_row(row: &SqliteRow) -> Result<IdentifiedRecord, StorageError> {
        let id: String = row.try_get("id").map_err(decode_error)?;
        let stored: Vec<u8> = row.try_get("image_payload").map_err(decode_error)?;
        let expected: String = row.try_get("payload_hash").map_err(decode_error)?;

        let image_payload = decode_payload(&stored)
            .map_err(|e| StorageError::Serialization(format!("payload for '{}': {}", id, e)))?;

        let actual = payload_digest(image_payload.as_bytes());
        if actual != expected {
            crate::metrics::record_corruption();
            return Err(StorageError::Corruption { id, expected, actual });
        }

        Ok(IdentifiedRecord {
            reference_id: row.try_get("reference_id").map_err(decode_error)?,
            display_name: row.try_get("display_name").map_err(decode_error)?,
            scientific_name: row.try_get("scientific_name").map_err(decode_error)?,
            confidence: row.try_get("confidence").map_err(decode_error)?,
            created_at: row.try_get("created_at").map_err(decode_error)?,
            synced: row.try_get("synced").map_err(decode_error)?,
            image_payload,
            id,
        })
    }

    async fn fetch_records(&self, op: &str, sql: &str) -> Result<Vec<IdentifiedRecord>, StorageError> {
        let rows = retry(op, &RetryConfig::query(), || async {
            sqlx::query(sql)
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)
        })
        .await?;

        // A tampered row stays on disk (and queued) but must not hide the rest
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::record_from_row(row) {
                Ok(record) => records.push(record),
                Err(StorageError::Corruption { id, expected, actual }) => {
                    warn!(operation = op, id = %id, expected = %expected, actual = %actual, "Skipping corrupted record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn put(&self, record: &IdentifiedRecord) -> Result<(), StorageError> {
        let payload = encode_payload(&record.image_payload, self.compress_payloads)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let payload_hash = record.payload_hash();

        let sql = "INSERT INTO identified_records \
                   (id, reference_id, display_name, scientific_name, confidence, image_payload, payload_hash, created_at, synced) \
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
                   ON CONFLICT(id) DO UPDATE SET \
                      reference_id = excluded.reference_id, \
                      display_name = excluded.display_name, \
                      scientific_name = excluded.scientific_name, \
                      confidence = excluded.confidence, \
                      image_payload = excluded.image_payload, \
                      payload_hash = excluded.payload_hash, \
                      created_at = excluded.created_at, \
                      synced = MAX(identified_records.synced, excluded.synced)";

        retry("sqlite_put", &RetryConfig::query(), || async {
            sqlx::query(sql)
                .bind(&record.id)
                .bind(&record.reference_id)
                .bind(&record.display_name)
                .bind(&record.scientific_name)
                .bind(record.confidence)
                .bind(&payload)
                .bind(&payload_hash)
                .bind(record.created_at)
                .bind(record.synced)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
            Ok(())
        })
        .await?;

        debug!(id = %record.id, bytes = payload.len(), "Record written");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<IdentifiedRecord>, StorageError> {
        let sql = format!("SELECT {} FROM identified_records WHERE id = ?", SELECT_COLUMNS);
        let row = retry("sqlite_get", &RetryConfig::query(), || async {
            sqlx::query(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)
        })
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<IdentifiedRecord>, StorageError> {
        let sql = format!(
            "SELECT {} FROM identified_records ORDER BY created_at DESC, id DESC",
            SELECT_COLUMNS
        );
        self.fetch_records("sqlite_list_all", &sql).await
    }

    async fn list_unsynced(&self) -> Result<Vec<IdentifiedRecord>, StorageError> {
        let sql = format!(
            "SELECT {} FROM identified_records WHERE synced = 0",
            SELECT_COLUMNS
        );
        self.fetch_records("sqlite_list_unsynced", &sql).await
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        retry("sqlite_delete", &RetryConfig::query(), || async {
            sqlx::query("DELETE FROM identified_records WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let result = retry("sqlite_clear", &RetryConfig::query(), || async {
            sqlx::query("DELETE FROM identified_records")
                .execute(&self.pool)
                .await
                .map_err(unavailable)
        })
        .await?;
        warn!(removed = result.rows_affected(), "Record store cleared");
        Ok(())
    }

    async fn mark_synced(&self, id: &str) -> Result<bool, StorageError> {
        let result = retry("sqlite_mark_synced", &RetryConfig::query(), || async {
            sqlx::query("UPDATE identified_records SET synced = 1 WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(unavailable)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_unsynced(&self) -> Result<usize, StorageError> {
        let row = retry("sqlite_count_unsynced", &RetryConfig::query(), || async {
            sqlx::query("SELECT COUNT(*) AS cnt FROM identified_records WHERE synced = 0")
                .fetch_one(&self.pool)
                .await
                .map_err(unavailable)
        })
        .await?;

        let count: i64 = row.try_get("cnt").map_err(decode_error)?;
        Ok(count as usize)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!(path = %self.path, "Record store closed");
    }
}
