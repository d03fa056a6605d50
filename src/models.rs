//! Data models and structures
//!
//! Catalog records as exchanged with the store API, plus the summaries a
//! synchronization run reports back to its caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

pub type ItemId = u64;
pub type AssetId = u64;

/// Metadata key holding the fingerprint of the last applied configuration.
pub const META_PROCESSED: &str = "_image_processed";
/// Metadata key holding the image ids replaced by the last run.
pub const META_OLD_IMAGE_IDS: &str = "_old_image_ids";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogImage {
    pub id: AssetId,
    #[serde(default)]
    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: Value,
}

impl MetaEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub images: Vec<CatalogImage>,
    #[serde(default, rename = "meta_data")]
    pub metadata: Vec<MetaEntry>,
}

impl CatalogItem {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            name: String::new(),
            slug: String::new(),
            sku: String::new(),
            images: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    /// Fingerprint recorded by the last successful run, if any.
    pub fn processed_marker(&self) -> Option<&str> {
        self.meta(META_PROCESSED).and_then(Value::as_str)
    }

    /// Image ids superseded by the last successful run.
    pub fn old_image_ids(&self) -> Vec<AssetId> {
        self.meta(META_OLD_IMAGE_IDS)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
            .unwrap_or_default()
    }

    /// Insert or replace a metadata entry.
    pub fn set_meta(&mut self, entry: MetaEntry) {
        match self.metadata.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => existing.value = entry.value,
            None => self.metadata.push(entry),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: AssetId,
}

/// Partial update sent to the catalog after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub images: Vec<ImageRef>,
    pub meta_data: Vec<MetaEntry>,
}

impl ItemUpdate {
    pub fn new(new_ids: &[AssetId], fingerprint: &str, old_ids: &[AssetId]) -> Self {
        Self {
            images: new_ids.iter().map(|&id| ImageRef { id }).collect(),
            meta_data: vec![
                MetaEntry::new(META_PROCESSED, fingerprint),
                MetaEntry::new(META_OLD_IMAGE_IDS, old_ids.to_vec()),
            ],
        }
    }
}

/// Outcome of one image's transform within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub succeeded: bool,
}

impl TransformResult {
    pub fn success(source_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            source_path,
            output_path,
            succeeded: true,
        }
    }

    pub fn failure(source_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            source_path,
            output_path,
            succeeded: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Stored marker matched the configuration; nothing was done.
    Skipped,
    /// The item was updated with at least one new image.
    Updated,
    /// Every image failed, so the item was left untouched.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemSummary {
    pub item_id: ItemId,
    pub outcome: ItemOutcome,
    pub old_ids: Vec<AssetId>,
    pub new_ids: Vec<AssetId>,
    pub results: Vec<TransformResult>,
    pub failed_deletions: Vec<AssetId>,
}

impl ItemSummary {
    pub fn skipped(item_id: ItemId) -> Self {
        Self {
            item_id,
            outcome: ItemOutcome::Skipped,
            old_ids: Vec::new(),
            new_ids: Vec::new(),
            results: Vec::new(),
            failed_deletions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total_processed: usize,
    pub updated: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub pages_fetched: u32,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: ItemOutcome) {
        self.total_processed += 1;
        match outcome {
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.total_processed += 1;
        self.failed += 1;
    }
}
