//! catalog-translate-sync: drains a pending-translation queue into the
//! catalog. Texts are deduplicated per cycle, served from a content-hash
//! cache when possible, and sent to the translation API in one batch per
//! field otherwise.

pub mod batcher;
pub mod cancellation;
pub mod config;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod sync;
pub mod translate;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cancellation::ShutdownCoordinator;
use config::{Cli, Config};
use error::{Result, SyncError};
use metrics::MetricsRegistry;
use scheduler::SyncScheduler;
use stats::StatsReport;
use store::SqliteStore;
use sync::SyncController;
use translate::{ContentCache, DeepSeekClient};

/// Install the global fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("catalog_translate_sync=info")),
        )
        .with_target(true)
        .with_thread_ids(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve configuration, open the store and either print statistics or run
/// the sync loop until Ctrl-C / SIGTERM.
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(&cli)?;
    let fields = config.field_map();

    let store = Arc::new(SqliteStore::open(&config.database.path).map_err(|e| {
        SyncError::Connectivity(format!(
            "cannot open {}: {e}",
            config.database.path.display()
        ))
    })?);
    info!(path = %config.database.path.display(), "store connected");

    let cache = ContentCache::new(store.clone(), config.cache.memory_capacity);

    if cli.show_stats {
        let report = StatsReport::collect(store.as_ref(), store.as_ref(), &cache, &fields)?;
        println!("{report}");
        return Ok(());
    }

    let translator = Arc::new(DeepSeekClient::from_env(&config.api)?);
    info!(
        base_url = %config.api.base_url,
        model = %config.api.model,
        "translation API client initialized"
    );

    let metrics = Arc::new(MetricsRegistry::new());
    let controller = Arc::new(
        SyncController::new(
            store.clone(),
            store.clone(),
            cache,
            translator,
            fields,
            config.batch_size,
        )
        .with_metrics(Arc::clone(&metrics)),
    );

    info!(
        interval_secs = config.check_interval_secs,
        batch_size = config.batch_size,
        fields = ?config.fields,
        "translation sync service starting"
    );
    match controller.stats() {
        Ok(stats) => stats.log(),
        Err(e) => warn!(error = %e, "initial statistics unavailable"),
    }

    let shutdown = ShutdownCoordinator::new();
    let listener = shutdown.spawn_signal_listener();
    let summary = SyncScheduler::new(controller, config.check_interval())
        .run(shutdown.token())
        .await;

    // a fatal stop leaves the listener waiting on a signal
    shutdown.trigger();
    if let Err(e) = listener.await {
        warn!(error = %e, "signal listener ended abnormally");
    }

    let counters = metrics.counters.snapshot();
    info!(
        cycles = summary.cycles,
        items_removed = counters.items_removed,
        api_calls = counters.api_calls,
        api_failures = counters.api_failures,
        "translation sync service stopped"
    );
    for (name, s) in metrics.summary() {
        info!(metric = %name, p50_ms = s.p50_ms, p95_ms = s.p95_ms, count = s.count, "timing");
    }
    Ok(())
}
