mod common;

use std::sync::Arc;

use catalog_translate_sync::error::SyncError;
use catalog_translate_sync::store::{CacheEntry, MemoryStore, QueueItem};
use catalog_translate_sync::sync::{CycleOutcome, CycleReport};
use catalog_translate_sync::translate::{ResponseParser, ResponseReconciler};

use common::{controller, seed_records, DictionaryTranslator};

fn processed(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Processed(report) => report,
        CycleOutcome::Idle => panic!("expected a processed cycle"),
    }
}

fn cache_entry(store: &MemoryStore, source: &str) -> CacheEntry {
    store
        .cache_entries()
        .into_iter()
        .find(|e| e.source_text == source)
        .unwrap_or_else(|| panic!("no cache entry for {source}"))
}

#[tokio::test]
async fn duplicate_names_are_translated_once_and_all_items_drained() {
    let store = Arc::new(MemoryStore::new());
    seed_records(&store, &["A", "B", "C"]);
    store.enqueue(QueueItem::new("A", 1).with_field("name", "路飞手办"));
    store.enqueue(QueueItem::new("B", 2).with_field("name", "路飞手办"));
    store.enqueue(QueueItem::new("C", 3).with_field("name", "索隆手办"));
    let translator = Arc::new(DictionaryTranslator::new(&[
        ("路飞手办", "Luffy Figure"),
        ("索隆手办", "Zoro Figure"),
    ]));

    let report = processed(controller(&store, &translator, 20).run_cycle().await.unwrap());

    assert_eq!(
        translator.calls(),
        vec![vec!["路飞手办".to_string(), "索隆手办".to_string()]]
    );
    assert_eq!(report.fetched, 3);
    assert_eq!(report.distinct_texts_sent, 2);
    assert_eq!(report.fields_from_api, 3);
    assert_eq!(report.items_removed, 3);
    assert_eq!(report.records_modified, 3);

    assert_eq!(cache_entry(&store, "路飞手办").usage_count, 2);
    assert_eq!(cache_entry(&store, "索隆手办").usage_count, 1);
    assert_eq!(store.record("A").unwrap()["nameCN"], "Luffy Figure");
    assert_eq!(store.record("B").unwrap()["nameCN"], "Luffy Figure");
    assert_eq!(store.record("C").unwrap()["nameCN"], "Zoro Figure");
    assert!(store.queued_ids().is_empty());
}

#[tokio::test]
async fn cached_texts_skip_the_api_and_bump_usage() {
    let store = Arc::new(MemoryStore::new());
    seed_records(&store, &["A", "B"]);
    let translator = Arc::new(DictionaryTranslator::new(&[("ナミ", "娜美")]));
    let sync = controller(&store, &translator, 20);

    store.enqueue(QueueItem::new("A", 1).with_field("name", "ナミ"));
    sync.run_cycle().await.unwrap();
    store.enqueue(QueueItem::new("B", 2).with_field("name", "ナミ"));
    let report = processed(sync.run_cycle().await.unwrap());

    assert_eq!(translator.calls().len(), 1);
    assert_eq!(report.fields_from_cache, 1);
    assert_eq!(report.fields_from_api, 0);
    assert_eq!(store.record("B").unwrap()["nameCN"], "娜美");
    assert_eq!(cache_entry(&store, "ナミ").usage_count, 2);
}

#[tokio::test]
async fn empty_queue_is_idle() {
    let store = Arc::new(MemoryStore::new());
    let translator = Arc::new(DictionaryTranslator::default());
    let sync = controller(&store, &translator, 20);

    assert_eq!(sync.run_cycle().await.unwrap(), CycleOutcome::Idle);
    assert!(translator.calls().is_empty());
    assert_eq!(sync.metrics().counters.snapshot().idle_cycles, 1);
}

#[tokio::test]
async fn only_the_oldest_batch_is_fetched() {
    let store = Arc::new(MemoryStore::new());
    seed_records(&store, &["A", "B", "C"]);
    store.enqueue(QueueItem::new("C", 30).with_field("name", "c"));
    store.enqueue(QueueItem::new("A", 10).with_field("name", "a"));
    store.enqueue(QueueItem::new("B", 20).with_field("name", "b"));
    let translator = Arc::new(DictionaryTranslator::default());

    let report = processed(controller(&store, &translator, 2).run_cycle().await.unwrap());

    assert_eq!(report.pending, 3);
    assert_eq!(report.fetched, 2);
    assert_eq!(translator.calls(), vec![vec!["a".to_string(), "b".to_string()]]);
    assert_eq!(store.queued_ids(), vec!["C"]);
}

#[tokio::test]
async fn failed_field_is_skipped_and_other_fields_commit() {
    let store = Arc::new(MemoryStore::new());
    seed_records(&store, &["A", "B"]);
    store.enqueue(
        QueueItem::new("A", 1)
            .with_field("name", "ルフィ")
            .with_field("description", "麦わらの一味の船長"),
    );
    store.enqueue(QueueItem::new("B", 2).with_field("description", "剣士"));
    let translator =
        Arc::new(DictionaryTranslator::new(&[("ルフィ", "路飞")]).failing_on("剣士"));
    let sync = controller(&store, &translator, 20);

    let report = processed(sync.run_cycle().await.unwrap());

    // name batch, then the description batch that fails as a whole
    assert_eq!(translator.calls().len(), 2);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.items_removed, 1);
    assert_eq!(report.items_retained, 1);

    let a = store.record("A").unwrap();
    assert_eq!(a["nameCN"], "路飞");
    assert!(!a.contains_key("descriptionCN"));
    assert!(store.record("B").unwrap().is_empty());
    assert_eq!(store.queued_ids(), vec!["B"]);
    // nothing from the failed call reaches the cache
    let cached: Vec<String> =
        store.cache_entries().into_iter().map(|e| e.source_text).collect();
    assert_eq!(cached, vec!["ルフィ"]);
    assert_eq!(sync.metrics().counters.snapshot().api_failures, 1);
}

#[tokio::test]
async fn write_back_failure_keeps_every_item_queued() {
    let store = Arc::new(MemoryStore::new());
    seed_records(&store, &["A", "B"]);
    store.enqueue(QueueItem::new("A", 1).with_field("name", "ゾロ"));
    store.enqueue(QueueItem::new("B", 2).with_field("name", "サンジ"));
    let translator = Arc::new(DictionaryTranslator::default());
    let sync = controller(&store, &translator, 20);

    store.fail_updates(true);
    let err = sync.run_cycle().await.unwrap_err();
    assert!(matches!(err, SyncError::WriteBack(_)));
    assert!(!err.is_fatal());
    assert_eq!(store.queued_ids(), vec!["A", "B"]);
    assert!(store.record("A").unwrap().is_empty());

    // translations were cached, so the retry needs no API call
    store.fail_updates(false);
    let report = processed(sync.run_cycle().await.unwrap());
    assert_eq!(translator.calls().len(), 1);
    assert_eq!(report.fields_from_cache, 2);
    assert_eq!(report.items_removed, 2);
    assert_eq!(store.record("A").unwrap()["nameCN"], "[T] ゾロ");
    assert_eq!(sync.metrics().counters.snapshot().failed_cycles, 1);
}

#[tokio::test]
async fn delete_failure_reprocesses_items_next_cycle() {
    let store = Arc::new(MemoryStore::new());
    seed_records(&store, &["A"]);
    store.enqueue(QueueItem::new("A", 1).with_field("name", "チョッパー"));
    let translator = Arc::new(DictionaryTranslator::new(&[("チョッパー", "乔巴")]));
    let sync = controller(&store, &translator, 20);

    store.fail_deletes(true);
    assert!(matches!(
        sync.run_cycle().await,
        Err(SyncError::WriteBack(_))
    ));
    // record already written, queue entry still present
    assert_eq!(store.record("A").unwrap()["nameCN"], "乔巴");
    assert_eq!(store.queued_ids(), vec!["A"]);

    store.fail_deletes(false);
    let report = processed(sync.run_cycle().await.unwrap());
    assert_eq!(report.items_removed, 1);
    assert_eq!(store.record("A").unwrap()["nameCN"], "乔巴");
    assert!(store.queued_ids().is_empty());
}

#[tokio::test]
async fn items_without_source_text_stay_queued() {
    let store = Arc::new(MemoryStore::new());
    seed_records(&store, &["A", "B"]);
    store.enqueue(QueueItem::new("A", 1).with_field("name", "").with_field("price", "3000"));
    store.enqueue(QueueItem::new("B", 2).with_field("name", "ロビン"));
    let translator = Arc::new(DictionaryTranslator::default());

    let report = processed(controller(&store, &translator, 20).run_cycle().await.unwrap());

    assert_eq!(report.items_without_source, 1);
    assert_eq!(report.items_retained, 1);
    assert_eq!(report.items_removed, 1);
    assert_eq!(report.records_modified, 1);
    assert!(store.record("A").unwrap().is_empty());
    assert_eq!(store.queued_ids(), vec!["A"]);
}

#[tokio::test]
async fn short_response_pads_with_source_text_and_caches_every_pair() {
    let store = Arc::new(MemoryStore::new());
    seed_records(&store, &["A", "B", "C"]);
    store.enqueue(QueueItem::new("A", 1).with_field("name", "ウソップ"));
    store.enqueue(QueueItem::new("B", 2).with_field("name", "フランキー"));
    store.enqueue(QueueItem::new("C", 3).with_field("name", "フランキー"));
    let translator =
        Arc::new(DictionaryTranslator::new(&[("ウソップ", "乌索普")]).dropping_tail(1));

    let report = processed(controller(&store, &translator, 20).run_cycle().await.unwrap());

    assert_eq!(report.fields_from_api, 1);
    assert_eq!(report.fields_fallback, 2);
    assert_eq!(store.record("A").unwrap()["nameCN"], "乌索普");
    assert_eq!(store.record("B").unwrap()["nameCN"], "フランキー");
    assert_eq!(store.record("C").unwrap()["nameCN"], "フランキー");
    assert_eq!(store.cache_entries().len(), 2);
    assert_eq!(cache_entry(&store, "ウソップ").translated_text, "乌索普");
    let fallback = cache_entry(&store, "フランキー");
    assert_eq!(fallback.translated_text, "フランキー");
    assert_eq!(fallback.usage_count, 2);
    assert!(store.queued_ids().is_empty());
}

#[tokio::test]
async fn custom_response_parser_drives_the_cycle() {
    struct TabParser;
    impl ResponseParser for TabParser {
        fn extract(&self, raw: &str) -> Vec<String> {
            raw.lines()
                .filter_map(|line| line.split_once('\t'))
                .map(|(_, text)| text.to_string())
                .collect()
        }
    }

    let store = Arc::new(MemoryStore::new());
    seed_records(&store, &["A"]);
    store.enqueue(QueueItem::new("A", 1).with_field("name", "ナミ"));
    let translator = Arc::new(DictionaryTranslator::new(&[("ナミ", "娜美")]));
    let sync = controller(&store, &translator, 20)
        .with_reconciler(ResponseReconciler::new(Box::new(TabParser)));

    let report = processed(sync.run_cycle().await.unwrap());

    // the numbered reply has no tab, so the parser yields nothing and pads
    assert_eq!(report.fields_from_api, 0);
    assert_eq!(report.fields_fallback, 1);
    assert_eq!(store.record("A").unwrap()["nameCN"], "ナミ");
}

#[tokio::test]
async fn missing_catalog_record_still_releases_the_queue_entry() {
    let store = Arc::new(MemoryStore::new());
    store.enqueue(QueueItem::new("ghost", 1).with_field("name", "ブルック"));
    let translator = Arc::new(DictionaryTranslator::default());

    let report = processed(controller(&store, &translator, 20).run_cycle().await.unwrap());

    assert_eq!(report.records_modified, 0);
    assert_eq!(report.items_removed, 1);
    assert!(store.queued_ids().is_empty());
}

#[tokio::test]
async fn stats_reflect_the_cycle() {
    let store = Arc::new(MemoryStore::new());
    seed_records(&store, &["A", "B", "C"]);
    store.enqueue(QueueItem::new("A", 1).with_field("name", "路飞手办"));
    store.enqueue(QueueItem::new("B", 2).with_field("name", "路飞手办"));
    let translator = Arc::new(DictionaryTranslator::default());
    let sync = controller(&store, &translator, 20);

    sync.run_cycle().await.unwrap();
    let stats = sync.stats().unwrap();

    assert_eq!(stats.pending, 0);
    assert_eq!(stats.translated_records, 2);
    assert_eq!(stats.total_records, 3);
    assert_eq!(stats.cache_entries, 1);
    assert_eq!(stats.cache_total_usage, 2);
}
