//! In-process store implementing all three collaborators. Used by the
//! test suites and for dry runs; write and delete failures can be injected.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{
    now_unix, CacheEntry, CacheStore, CacheTotals, CatalogStore, QueueItem, QueueStore,
    StoreError, WriteBackOperation,
};

#[derive(Default)]
struct MemoryState {
    /// item id → (insertion sequence, item)
    queue: HashMap<String, (u64, QueueItem)>,
    next_seq: u64,
    records: BTreeMap<String, BTreeMap<String, String>>,
    cache: HashMap<String, CacheEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, item: QueueItem) {
        let mut state = self.state.lock();
        let seq = match state.queue.get(&item.id) {
            Some((seq, _)) => *seq,
            None => {
                state.next_seq += 1;
                state.next_seq
            }
        };
        state.queue.insert(item.id.clone(), (seq, item));
    }

    pub fn put_record(&self, item_id: &str, fields: BTreeMap<String, String>) {
        self.state.lock().records.insert(item_id.to_string(), fields);
    }

    pub fn record(&self, item_id: &str) -> Option<BTreeMap<String, String>> {
        self.state.lock().records.get(item_id).cloned()
    }

    /// Queue ids in FIFO order.
    pub fn queued_ids(&self) -> Vec<String> {
        self.ordered_queue().into_iter().map(|item| item.id).collect()
    }

    pub fn cache_entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.state.lock().cache.values().cloned().collect();
        entries.sort_by(|a, b| a.source_text.cmp(&b.source_text));
        entries
    }

    /// Make every subsequent `bulk_update` fail until reset.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete_by_ids` fail until reset.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn ordered_queue(&self) -> Vec<QueueItem> {
        let state = self.state.lock();
        let mut items: Vec<&(u64, QueueItem)> = state.queue.values().collect();
        items.sort_by_key(|(seq, item)| (item.enqueued_at, *seq));
        let ordered = items.into_iter().map(|(_, item)| item.clone()).collect();
        ordered
    }
}

impl QueueStore for MemoryStore {
    fn count_pending(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().queue.len() as u64)
    }

    fn fetch_oldest(&self, limit: usize) -> Result<Vec<QueueItem>, StoreError> {
        let mut items = self.ordered_queue();
        items.truncate(limit);
        Ok(items)
    }

    fn delete_by_ids(&self, ids: &[String]) -> Result<usize, StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("queue delete rejected".into()));
        }
        let mut state = self.state.lock();
        Ok(ids.iter().filter(|id| state.queue.remove(*id).is_some()).count())
    }
}

impl CatalogStore for MemoryStore {
    fn bulk_update(&self, ops: &[WriteBackOperation]) -> Result<usize, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("bulk update rejected".into()));
        }
        let mut state = self.state.lock();
        let mut modified = 0;
        for op in ops {
            if let Some(record) = state.records.get_mut(&op.item_id) {
                record.extend(op.updates.iter().map(|(k, v)| (k.clone(), v.clone())));
                modified += 1;
            }
        }
        Ok(modified)
    }

    fn count_records(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().records.len() as u64)
    }

    fn count_translated(&self, target_fields: &[&str]) -> Result<u64, StoreError> {
        let state = self.state.lock();
        let count = state
            .records
            .values()
            .filter(|record| target_fields.iter().any(|f| record.contains_key(*f)))
            .count();
        Ok(count as u64)
    }
}

impl CacheStore for MemoryStore {
    fn find_by_hash(&self, text_hash: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.state.lock().cache.get(text_hash).cloned())
    }

    fn upsert_increment(
        &self,
        text_hash: &str,
        source_text: &str,
        translated_text: &str,
        uses: u64,
    ) -> Result<CacheEntry, StoreError> {
        let now = now_unix();
        let mut state = self.state.lock();
        let entry = state
            .cache
            .entry(text_hash.to_string())
            .and_modify(|entry| {
                entry.usage_count += uses;
                entry.updated_at = now;
            })
            .or_insert_with(|| CacheEntry {
                text_hash: text_hash.to_string(),
                source_text: source_text.to_string(),
                translated_text: translated_text.to_string(),
                usage_count: uses,
                created_at: now,
                updated_at: now,
            });
        Ok(entry.clone())
    }

    fn cache_totals(&self) -> Result<CacheTotals, StoreError> {
        let state = self.state.lock();
        Ok(CacheTotals {
            entries: state.cache.len() as u64,
            total_usage: state.cache.values().map(|e| e.usage_count).sum(),
        })
    }
}
