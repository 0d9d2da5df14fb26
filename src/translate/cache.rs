//! Content-addressed translation cache.
//! Key: blake3 hex digest of the exact source text (whitespace and case kept).
//! An in-memory LRU sits in front of the shared `CacheStore`; stored
//! translations never change once written, so the LRU cannot go stale.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::store::{CacheEntry, CacheStore, CacheTotals, StoreError};

/// Compute the cache key for a source text.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

pub struct ContentCache {
    store: Arc<dyn CacheStore>,
    /// hash → translated text
    front: Mutex<LruCache<String, String>>,
}

impl ContentCache {
    pub fn new(store: Arc<dyn CacheStore>, capacity: usize) -> Self {
        Self {
            store,
            front: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Look up a cached translation. No side effects on a miss.
    pub fn lookup(&self, text: &str) -> Result<Option<String>, StoreError> {
        let key = content_hash(text);
        if let Some(hit) = self.front.lock().get(&key) {
            return Ok(Some(hit.clone()));
        }
        let Some(entry) = self.store.find_by_hash(&key)? else {
            return Ok(None);
        };
        self.front.lock().put(key, entry.translated_text.clone());
        Ok(Some(entry.translated_text))
    }

    /// Record one use of `text`: create the entry with `translation`, or keep
    /// the stored translation and bump its usage.
    pub fn store_or_touch(&self, text: &str, translation: &str) -> Result<CacheEntry, StoreError> {
        self.record_uses(text, translation, 1)
    }

    /// Same as `store_or_touch`, counting `uses` hits in one write.
    pub fn record_uses(
        &self,
        text: &str,
        translation: &str,
        uses: u64,
    ) -> Result<CacheEntry, StoreError> {
        let key = content_hash(text);
        let entry = self.store.upsert_increment(&key, text, translation, uses)?;
        self.front.lock().put(key, entry.translated_text.clone());
        Ok(entry)
    }

    pub fn totals(&self) -> Result<CacheTotals, StoreError> {
        self.store.cache_totals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache() -> (Arc<MemoryStore>, ContentCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = ContentCache::new(store.clone(), 16);
        (store, cache)
    }

    #[test]
    fn hash_is_exact_and_stable() {
        assert_eq!(content_hash("ルフィ"), content_hash("ルフィ"));
        assert_ne!(content_hash("Luffy"), content_hash("luffy"));
        assert_ne!(content_hash("Luffy"), content_hash("Luffy "));
        assert_eq!(content_hash("x").len(), 64);
    }

    #[test]
    fn lookup_miss_has_no_side_effects() {
        let (store, cache) = cache();
        assert_eq!(cache.lookup("ナミ").unwrap(), None);
        assert!(store.cache_entries().is_empty());
    }

    #[test]
    fn store_or_touch_keeps_first_translation_and_counts_every_call() {
        let (store, cache) = cache();
        cache.store_or_touch("ゾロ", "索隆").unwrap();
        let second = cache.store_or_touch("ゾロ", "佐罗").unwrap();

        assert_eq!(second.translated_text, "索隆");
        assert_eq!(second.usage_count, 2);
        assert_eq!(cache.lookup("ゾロ").unwrap().as_deref(), Some("索隆"));

        let entries = store.cache_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_text, "ゾロ");
    }

    #[test]
    fn lookup_reads_through_to_store() {
        let (store, cache) = cache();
        store
            .upsert_increment(&content_hash("サンジ"), "サンジ", "山治", 1)
            .unwrap();
        assert_eq!(cache.lookup("サンジ").unwrap().as_deref(), Some("山治"));
        // Lookups never count as uses.
        assert_eq!(store.cache_entries()[0].usage_count, 1);
    }

    #[test]
    fn record_uses_adds_all_uses_at_once() {
        let (_store, cache) = cache();
        let entry = cache.record_uses("ウソップ", "乌索普", 3).unwrap();
        assert_eq!(entry.usage_count, 3);
        assert_eq!(cache.totals().unwrap().total_usage, 3);
    }
}
