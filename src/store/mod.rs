//! Store collaborators: the pending-translation queue, the primary catalog
//! and the translation cache. All three are external and shared; every
//! operation here is document-level atomic, nothing spans documents.

pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One unit of pending work, keyed by the primary record's identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    /// Source-language values keyed by source field name.
    pub fields: BTreeMap<String, String>,
    /// Unix seconds.
    pub enqueued_at: i64,
}

impl QueueItem {
    pub fn new(id: impl Into<String>, enqueued_at: i64) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
            enqueued_at,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Source value for `field`, if present and non-empty.
    pub fn source(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// A cached translation, keyed by the content hash of its source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub text_hash: String,
    pub source_text: String,
    pub translated_text: String,
    pub usage_count: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Target field → translated value for one primary record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBackOperation {
    pub item_id: String,
    pub updates: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheTotals {
    pub entries: u64,
    pub total_usage: u64,
}

pub trait QueueStore: Send + Sync {
    fn count_pending(&self) -> Result<u64, StoreError>;

    /// Up to `limit` items, oldest enqueued first.
    fn fetch_oldest(&self, limit: usize) -> Result<Vec<QueueItem>, StoreError>;

    fn delete_by_ids(&self, ids: &[String]) -> Result<usize, StoreError>;
}

pub trait CatalogStore: Send + Sync {
    /// Applies every operation; returns how many records were modified.
    /// Operations for unknown records are no-ops.
    fn bulk_update(&self, ops: &[WriteBackOperation]) -> Result<usize, StoreError>;

    fn count_records(&self) -> Result<u64, StoreError>;

    /// Records carrying at least one of `target_fields`.
    fn count_translated(&self, target_fields: &[&str]) -> Result<u64, StoreError>;
}

pub trait CacheStore: Send + Sync {
    fn find_by_hash(&self, text_hash: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Inserts a new entry with `usage_count = uses`, or leaves the stored
    /// translation untouched and adds `uses` to its counter. Returns the
    /// entry as stored after the write.
    fn upsert_increment(
        &self,
        text_hash: &str,
        source_text: &str,
        translated_text: &str,
        uses: u64,
    ) -> Result<CacheEntry, StoreError>;

    fn cache_totals(&self) -> Result<CacheTotals, StoreError>;
}

/// Current time as Unix timestamp (seconds).
pub(crate) fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
