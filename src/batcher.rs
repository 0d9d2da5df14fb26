//! Dedup batching: resolves cache hits in place and collapses the remaining
//! item × field work into one entry per distinct source text.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::store::{QueueItem, WriteBackOperation};
use crate::translate::ContentCache;

/// One translatable field: where the source text is read and where the
/// translation is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub source: String,
    pub target: String,
}

/// Ordered table of translatable fields. Adding a field is a table entry,
/// nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: Vec<FieldSpec>,
}

impl FieldMap {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// `name` → `name{suffix}` for every field, keeping order.
    pub fn with_suffix(names: &[String], suffix: &str) -> Self {
        Self::new(
            names
                .iter()
                .map(|name| FieldSpec {
                    source: name.clone(),
                    target: format!("{name}{suffix}"),
                })
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub fn targets(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.target.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Translations resolved so far for one fetched item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTranslations {
    pub item_id: String,
    /// target field → translated value
    pub values: BTreeMap<String, String>,
    /// Whether any configured field had a non-empty source value.
    pub has_source: bool,
}

impl ItemTranslations {
    pub fn write_back(&self) -> Option<WriteBackOperation> {
        if self.values.is_empty() {
            return None;
        }
        Some(WriteBackOperation {
            item_id: self.item_id.clone(),
            updates: self.values.clone(),
        })
    }
}

/// Distinct source texts of one field in first-seen order, each with every
/// item position that needs its translation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinctTexts {
    texts: Vec<String>,
    positions: Vec<Vec<usize>>,
    index: HashMap<String, usize>,
}

impl DistinctTexts {
    pub fn insert(&mut self, text: &str, position: usize) {
        match self.index.get(text) {
            Some(&slot) => self.positions[slot].push(position),
            None => {
                self.index.insert(text.to_string(), self.texts.len());
                self.texts.push(text.to_string());
                self.positions.push(vec![position]);
            }
        }
    }

    /// Texts in request order.
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn positions_of(&self, text: &str) -> &[usize] {
        self.index
            .get(text)
            .map_or(&[][..], |&slot| self.positions[slot].as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.texts
            .iter()
            .map(String::as_str)
            .zip(self.positions.iter().map(Vec::as_slice))
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Cache misses of one field: the unit of work for one API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBatch {
    pub field: FieldSpec,
    pub texts: DistinctTexts,
}

#[derive(Debug)]
pub struct DedupOutcome {
    /// Index-aligned with the input items.
    pub items: Vec<ItemTranslations>,
    /// Non-empty batches, in field-table order.
    pub batches: Vec<FieldBatch>,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

pub struct DedupBatcher<'a> {
    cache: &'a ContentCache,
    fields: &'a FieldMap,
}

impl<'a> DedupBatcher<'a> {
    pub fn new(cache: &'a ContentCache, fields: &'a FieldMap) -> Self {
        Self { cache, fields }
    }

    pub fn partition(&self, items: &[QueueItem]) -> DedupOutcome {
        let mut resolved: Vec<ItemTranslations> = items
            .iter()
            .map(|item| ItemTranslations {
                item_id: item.id.clone(),
                values: BTreeMap::new(),
                has_source: self.fields.iter().any(|f| item.source(&f.source).is_some()),
            })
            .collect();
        let mut misses: Vec<DistinctTexts> = vec![DistinctTexts::default(); self.fields.len()];
        let mut cache_hits = 0;
        let mut cache_misses = 0;

        for (position, item) in items.iter().enumerate() {
            for (slot, field) in self.fields.iter().enumerate() {
                let Some(text) = item.source(&field.source) else {
                    continue;
                };

                let cached = match self.cache.lookup(text) {
                    Ok(cached) => cached,
                    Err(e) => {
                        warn!(
                            item = %item.id,
                            field = %field.source,
                            error = %e,
                            "cache lookup failed"
                        );
                        continue;
                    }
                };

                match cached {
                    Some(translation) => {
                        debug!(item = %item.id, field = %field.source, "cache hit");
                        if let Err(e) = self.cache.store_or_touch(text, &translation) {
                            warn!(error = %e, "cache usage update failed");
                        }
                        resolved[position]
                            .values
                            .insert(field.target.clone(), translation);
                        cache_hits += 1;
                    }
                    None => {
                        debug!(item = %item.id, field = %field.source, "cache miss");
                        misses[slot].insert(text, position);
                        cache_misses += 1;
                    }
                }
            }
        }

        let batches = self
            .fields
            .iter()
            .zip(misses)
            .filter(|(_, texts)| !texts.is_empty())
            .map(|(field, texts)| FieldBatch {
                field: field.clone(),
                texts,
            })
            .collect();

        DedupOutcome {
            items: resolved,
            batches,
            cache_hits,
            cache_misses,
        }
    }
}
