// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Identification record data structure.
//!
//! An [`IdentifiedRecord`] is one plant-identification event captured on the
//! device. Everything except `synced` is fixed at creation; `synced` only ever
//! moves from `false` to `true`.
//!
//! # Example
//!
//! ```
//! use plant_cache::{IdentifiedRecord, RecordDraft};
//!
//! let draft = RecordDraft::new("Tulasi", "Ocimum tenuiflorum", 0.92, "data:image/jpeg;base64,AAAA");
//! let record = IdentifiedRecord::from_draft(draft);
//!
//! assert!(record.id.starts_with("plant-"));
//! assert!(!record.synced);
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Prefix for every generated record id.
pub const RECORD_ID_PREFIX: &str = "plant-";

static LAST_CREATED_AT: AtomicI64 = AtomicI64::new(0);

/// Caller-supplied fields of a new identification.
///
/// The cache stamps `id`, `created_at` and `synced` when the draft is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub display_name: String,
    pub scientific_name: String,
    pub confidence: f64,
    pub image_payload: String,
}

impl RecordDraft {
    pub fn new(
        display_name: impl Into<String>,
        scientific_name: impl Into<String>,
        confidence: f64,
        image_payload: impl Into<String>,
    ) -> Self {
        Self {
            reference_id: None,
            display_name: display_name.into(),
            scientific_name: scientific_name.into(),
            confidence,
            image_payload: image_payload.into(),
        }
    }

    /// Link the draft to a catalog entry.
    #[must_use]
    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    /// Check field constraints that the store relies on.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        if self.display_name.trim().is_empty() {
            return Err("display name is empty".to_string());
        }
        Ok(())
    }
}

/// A locally persisted identification, awaiting or past remote reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiedRecord {
    /// Opaque unique id (`plant-<uuid>`)
    pub id: String,
    /// Catalog key, absent when the identification matched nothing known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub display_name: String,
    pub scientific_name: String,
    /// Score in [0, 1]
    pub confidence: f64,
    /// Self-contained encoded image, potentially large
    pub image_payload: String,
    /// Creation time (epoch millis), strictly increasing within a process
    pub created_at: i64,
    /// Whether the remote side has accepted this record
    pub synced: bool,
}

impl IdentifiedRecord {
    /// Stamp a draft with a fresh id and creation time.
    pub fn from_draft(draft: RecordDraft) -> Self {
        Self {
            id: generate_id(),
            reference_id: draft.reference_id,
            display_name: draft.display_name,
            scientific_name: draft.scientific_name,
            confidence: draft.confidence,
            image_payload: draft.image_payload,
            created_at: next_created_at(),
            synced: false,
        }
    }

    /// SHA-256 of the image payload, hex encoded.
    #[must_use]
    pub fn payload_hash(&self) -> String {
        payload_digest(self.image_payload.as_bytes())
    }

    /// Copy of this record with `synced` set.
    #[must_use]
    pub fn into_synced(mut self) -> Self {
        self.synced = true;
        self
    }
}

pub(crate) fn payload_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Generate a collision-resistant record id.
pub fn generate_id() -> String {
    format!("{}{}", RECORD_ID_PREFIX, Uuid::new_v4().simple())
}

/// Current epoch millis, bumped past the last value handed out so rapid
/// successive creations never share a timestamp.
pub fn next_created_at() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;

    let mut last = LAST_CREATED_AT.load(Ordering::Acquire);
    loop {
        let next = now.max(last + 1);
        match LAST_CREATED_AT.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}
