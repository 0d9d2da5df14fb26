//! Progress statistics: queue depth, catalog coverage, cache usage.

use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::batcher::FieldMap;
use crate::store::{CatalogStore, QueueStore, StoreError};
use crate::translate::ContentCache;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub pending: u64,
    /// Records carrying at least one target field.
    pub translated_records: u64,
    pub total_records: u64,
    pub cache_entries: u64,
    pub cache_total_usage: u64,
}

impl StatsReport {
    pub fn collect(
        queue: &dyn QueueStore,
        catalog: &dyn CatalogStore,
        cache: &ContentCache,
        fields: &FieldMap,
    ) -> Result<Self, StoreError> {
        let totals = cache.totals()?;
        Ok(Self {
            pending: queue.count_pending()?,
            translated_records: catalog.count_translated(&fields.targets())?,
            total_records: catalog.count_records()?,
            cache_entries: totals.entries,
            cache_total_usage: totals.total_usage,
        })
    }

    pub fn log(&self) {
        info!(
            pending = self.pending,
            translated = self.translated_records,
            total = self.total_records,
            cache_entries = self.cache_entries,
            cache_uses = self.cache_total_usage,
            "translation statistics"
        );
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Translation pending: {} items", self.pending)?;
        write!(
            f,
            "Translated products: {}/{}",
            self.translated_records, self.total_records
        )?;
        if self.cache_entries > 0 {
            write!(
                f,
                "\nTranslation cache: {} entries, {} total uses",
                self.cache_entries, self.cache_total_usage
            )?;
        }
        Ok(())
    }
}
