// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reference catalog lookup.
//!
//! The catalog is static reference data; the cache only uses it to resolve
//! a record's `reference_id` from the identified names.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub sanskrit_name: String,
    pub botanical_name: String,
    #[serde(default)]
    pub vernacular_name: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub therapeutic_uses: Vec<String>,
}

impl CatalogEntry {
    fn matches(&self, needle: &str) -> bool {
        self.sanskrit_name.to_lowercase().contains(needle)
            || self.botanical_name.to_lowercase().contains(needle)
            || self.vernacular_name.to_lowercase().contains(needle)
            || self.therapeutic_uses.iter().any(|u| u.to_lowercase().contains(needle))
    }
}

pub trait CatalogLookup: Send + Sync {
    /// Case-insensitive free-text search. An empty query returns everything.
    fn search(&self, query: &str) -> Vec<CatalogEntry>;

    fn get(&self, id: &str) -> Option<CatalogEntry>;

    /// Catalog entry for an identification result, if any.
    fn match_identification(&self, display_name: &str, scientific_name: &str) -> Option<CatalogEntry>;
}

/// In-memory catalog loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: Vec<CatalogEntry>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CatalogLookup for StaticCatalog {
    fn search(&self, query: &str) -> Vec<CatalogEntry> {
        let needle = query.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|e| needle.is_empty() || e.matches(&needle))
            .cloned()
            .collect()
    }

    fn get(&self, id: &str) -> Option<CatalogEntry> {
        self.entries.iter().find(|e| e.id == id).cloned()
    }

    fn match_identification(&self, display_name: &str, scientific_name: &str) -> Option<CatalogEntry> {
        let display = display_name.trim().to_lowercase();
        let scientific = scientific_name.trim().to_lowercase();
        if display.is_empty() && scientific.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .find(|e| {
                (!display.is_empty() && e.sanskrit_name.to_lowercase().contains(&display))
                    || (!scientific.is_empty() && e.botanical_name.to_lowercase().contains(&scientific))
            })
            .cloned()
    }
}
