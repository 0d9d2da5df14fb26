// Shared fixtures for the integration tests: a scripted batch translator
// and a pre-wired controller over the in-memory store.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use catalog_translate_sync::batcher::FieldMap;
use catalog_translate_sync::store::MemoryStore;
use catalog_translate_sync::sync::SyncController;
use catalog_translate_sync::translate::{BatchTranslator, ContentCache, TranslateError};

/// Answers from a fixed dictionary in the numbered one-line format.
/// Unknown texts get `[T] <text>`. Any batch containing a configured
/// failing text is rejected as a whole.
#[derive(Default)]
pub struct DictionaryTranslator {
    dictionary: HashMap<String, String>,
    failing: Vec<String>,
    /// Answer with this many lines fewer than requested.
    drop_tail: usize,
    calls: Mutex<Vec<Vec<String>>>,
}

impl DictionaryTranslator {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            dictionary: pairs
                .iter()
                .map(|(s, t)| (s.to_string(), t.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.push(text.to_string());
        self
    }

    pub fn dropping_tail(mut self, n: usize) -> Self {
        self.drop_tail = n;
        self
    }

    /// Every batch received so far, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn translation_of(&self, text: &str) -> String {
        self.dictionary
            .get(text)
            .cloned()
            .unwrap_or_else(|| format!("[T] {text}"))
    }
}

#[async_trait]
impl BatchTranslator for DictionaryTranslator {
    async fn translate_batch(&self, texts: &[String]) -> Result<String, TranslateError> {
        self.calls.lock().push(texts.to_vec());
        if texts.iter().any(|t| self.failing.contains(t)) {
            return Err(TranslateError::Server {
                status: 503,
                body: "overloaded".into(),
            });
        }
        let answered = texts.len().saturating_sub(self.drop_tail);
        Ok(texts[..answered]
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {}", i + 1, self.translation_of(t)))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

pub fn default_fields() -> FieldMap {
    FieldMap::with_suffix(&["name".to_string(), "description".to_string()], "CN")
}

pub fn controller(
    store: &Arc<MemoryStore>,
    translator: &Arc<DictionaryTranslator>,
    batch_size: usize,
) -> SyncController {
    SyncController::new(
        store.clone(),
        store.clone(),
        ContentCache::new(store.clone(), 64),
        translator.clone(),
        default_fields(),
        batch_size,
    )
}

/// Empty catalog records for `ids`.
pub fn seed_records(store: &MemoryStore, ids: &[&str]) {
    for id in ids {
        store.put_record(id, BTreeMap::new());
    }
}
