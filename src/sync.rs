//! Sync cycle: count → fetch → dedup/cache → translate misses → cache
//! reconciled results → write back → delete the written queue entries.
//!
//! A queue entry is deleted only after the bulk update carrying its
//! translations succeeded. An API failure costs one field for one cycle;
//! a store failure during commit aborts the cycle with nothing deleted.

use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::batcher::{DedupBatcher, FieldBatch, FieldMap, ItemTranslations};
use crate::error::{Result, SyncError};
use crate::metrics::{metric_names, MetricsRegistry, SyncCounters};
use crate::stats::StatsReport;
use crate::store::{CatalogStore, QueueStore, StoreError, WriteBackOperation};
use crate::translate::{BatchTranslator, ContentCache, ResponseReconciler};

/// Counts for one processed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pending: u64,
    pub fetched: usize,
    pub fields_from_cache: usize,
    pub fields_from_api: usize,
    /// Positions filled with their source text because the response was short.
    pub fields_fallback: usize,
    pub distinct_texts_sent: usize,
    pub failed_batches: usize,
    pub records_modified: usize,
    pub items_removed: usize,
    /// Retained items that had no value in any configured field.
    pub items_without_source: usize,
    /// Still queued: nothing was written back for them this cycle.
    pub items_retained: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Idle,
    Processed(CycleReport),
}

pub struct SyncController {
    queue: Arc<dyn QueueStore>,
    catalog: Arc<dyn CatalogStore>,
    cache: ContentCache,
    translator: Arc<dyn BatchTranslator>,
    reconciler: ResponseReconciler,
    fields: FieldMap,
    batch_size: usize,
    metrics: Arc<MetricsRegistry>,
}

impl SyncController {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        catalog: Arc<dyn CatalogStore>,
        cache: ContentCache,
        translator: Arc<dyn BatchTranslator>,
        fields: FieldMap,
        batch_size: usize,
    ) -> Self {
        Self {
            queue,
            catalog,
            cache,
            translator,
            reconciler: ResponseReconciler::default(),
            fields,
            batch_size,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_reconciler(mut self, reconciler: ResponseReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Queue, catalog and cache statistics.
    pub fn stats(&self) -> std::result::Result<StatsReport, StoreError> {
        StatsReport::collect(
            self.queue.as_ref(),
            self.catalog.as_ref(),
            &self.cache,
            &self.fields,
        )
    }

    /// Run one cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let span = info_span!("cycle", id = %uuid::Uuid::new_v4());
        let timer = self.metrics.span(metric_names::CYCLE);
        let result = self.cycle().instrument(span).await;
        timer.finish();

        let counters = &self.metrics.counters;
        SyncCounters::add(&counters.cycles, 1);
        match &result {
            Ok(CycleOutcome::Idle) => SyncCounters::add(&counters.idle_cycles, 1),
            Ok(CycleOutcome::Processed(report)) => {
                SyncCounters::add(&counters.items_removed, report.items_removed);
                SyncCounters::add(&counters.fields_from_cache, report.fields_from_cache);
                SyncCounters::add(&counters.fields_from_api, report.fields_from_api);
            }
            Err(_) => SyncCounters::add(&counters.failed_cycles, 1),
        }
        result
    }

    async fn cycle(&self) -> Result<CycleOutcome> {
        let pending = self.queue.count_pending()?;
        if pending == 0 {
            return Ok(CycleOutcome::Idle);
        }
        info!(pending, "found pending items");

        let timer = self.metrics.span(metric_names::QUEUE_FETCH);
        let items = self.queue.fetch_oldest(self.batch_size)?;
        timer.finish();
        if items.is_empty() {
            return Ok(CycleOutcome::Idle);
        }
        info!(count = items.len(), "processing items with cache");

        let dedup = DedupBatcher::new(&self.cache, &self.fields).partition(&items);
        info!(
            cache_hits = dedup.cache_hits,
            cache_misses = dedup.cache_misses,
            "cache lookup done"
        );

        let mut report = CycleReport {
            pending,
            fetched: items.len(),
            fields_from_cache: dedup.cache_hits,
            ..CycleReport::default()
        };
        let mut resolved = dedup.items;

        for batch in &dedup.batches {
            self.translate_field(batch, &mut resolved, &mut report).await;
        }

        let (ops, delete_ids) = plan_commit(&resolved, &mut report);
        self.commit(&ops, &delete_ids, &mut report)?;

        Ok(CycleOutcome::Processed(report))
    }

    /// One API call for one field's distinct texts. Failures are absorbed:
    /// the field stays unset on every affected item.
    async fn translate_field(
        &self,
        batch: &FieldBatch,
        resolved: &mut [ItemTranslations],
        report: &mut CycleReport,
    ) {
        let texts = batch.texts.texts();
        info!(field = %batch.field.source, unique = texts.len(), "translating unique texts");
        for (i, text) in texts.iter().enumerate() {
            debug!(n = i + 1, text = %text, "queued for translation");
        }

        let counters = &self.metrics.counters;
        SyncCounters::add(&counters.api_calls, 1);
        report.distinct_texts_sent += texts.len();

        let timer = self.metrics.span(metric_names::API_CALL);
        let result = self.translator.translate_batch(texts).await;
        timer.finish();

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    field = %batch.field.source,
                    error = %e,
                    "translation failed, field skipped this cycle"
                );
                SyncCounters::add(&counters.api_failures, 1);
                report.failed_batches += 1;
                return;
            }
        };

        let reconciled = self.reconciler.reconcile(&raw, texts);
        for (i, (text, positions)) in batch.texts.iter().enumerate() {
            let translation = &reconciled.translations[i];
            if reconciled.is_translated(i) {
                report.fields_from_api += positions.len();
            } else {
                report.fields_fallback += positions.len();
            }
            let value = match self.cache.record_uses(text, translation, positions.len() as u64) {
                Ok(entry) => entry.translated_text,
                Err(e) => {
                    warn!(error = %e, "caching translation failed");
                    translation.clone()
                }
            };
            debug!(source = %text, translation = %value, "translated");

            for &position in positions {
                resolved[position]
                    .values
                    .insert(batch.field.target.clone(), value.clone());
            }
        }
        info!(field = %batch.field.source, "field translation done");
    }

    /// Bulk update, then delete exactly the committed ids.
    fn commit(
        &self,
        ops: &[WriteBackOperation],
        delete_ids: &[String],
        report: &mut CycleReport,
    ) -> Result<()> {
        if !ops.is_empty() {
            let timer = self.metrics.span(metric_names::WRITE_BACK);
            let modified = self.catalog.bulk_update(ops).map_err(SyncError::WriteBack)?;
            timer.finish();
            if modified < ops.len() {
                warn!(modified, expected = ops.len(), "some records were not found in the catalog");
            }
            info!(modified, "updated catalog records");
            report.records_modified = modified;
        }

        if !delete_ids.is_empty() {
            let deleted = self
                .queue
                .delete_by_ids(delete_ids)
                .map_err(SyncError::WriteBack)?;
            info!(deleted, "removed items from translation queue");
            report.items_removed = deleted;
        }
        Ok(())
    }
}

/// Write-back operations plus the queue ids they release.
fn plan_commit(
    resolved: &[ItemTranslations],
    report: &mut CycleReport,
) -> (Vec<WriteBackOperation>, Vec<String>) {
    let mut ops = Vec::new();
    let mut delete_ids = Vec::new();
    for item in resolved {
        if let Some(op) = item.write_back() {
            ops.push(op);
            delete_ids.push(item.item_id.clone());
        } else {
            if !item.has_source {
                report.items_without_source += 1;
            }
            report.items_retained += 1;
        }
    }
    (ops, delete_ids)
}
