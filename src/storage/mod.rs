// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record store backends.

pub mod traits;
pub mod memory;
pub mod sqlite;

pub use traits::{RecordStore, StorageError};
pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;
