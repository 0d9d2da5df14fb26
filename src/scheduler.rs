//! Fixed-interval, single-flight cycle loop.
//!
//! The next cycle starts only after the previous one returned; ticks missed
//! while a cycle ran are skipped, not replayed. Shutdown is observed between
//! cycles, so an in-flight cycle always finishes its commit.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::sync::{CycleOutcome, SyncController};

/// Cycle tallies for one scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub cycles: u64,
    pub idle: u64,
    pub processed: u64,
    pub failed: u64,
}

pub struct SyncScheduler {
    controller: Arc<SyncController>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(controller: Arc<SyncController>, interval: Duration) -> Self {
        Self {
            controller,
            interval,
        }
    }

    /// Run cycles until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) -> LoopSummary {
        let mut summary = LoopSummary::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs_f64(), "sync loop started");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            summary.cycles += 1;
            match self.controller.run_cycle().await {
                Ok(CycleOutcome::Idle) => {
                    summary.idle += 1;
                    info!("no pending translations");
                }
                Ok(CycleOutcome::Processed(report)) => {
                    summary.processed += 1;
                    info!(
                        fetched = report.fetched,
                        removed = report.items_removed,
                        from_cache = report.fields_from_cache,
                        from_api = report.fields_from_api,
                        failed_batches = report.failed_batches,
                        "cycle complete"
                    );
                    match self.controller.stats() {
                        Ok(stats) => stats.log(),
                        Err(e) => warn!(error = %e, "statistics unavailable"),
                    }
                }
                Err(e) if e.is_fatal() => {
                    summary.failed += 1;
                    error!(error = %e, "fatal error, stopping sync loop");
                    break;
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(error = %e, "sync cycle failed, retrying next interval");
                }
            }
        }

        info!(
            cycles = summary.cycles,
            processed = summary.processed,
            failed = summary.failed,
            "sync loop stopped"
        );
        summary
    }

    pub fn spawn(self, token: CancellationToken) -> tokio::task::JoinHandle<LoopSummary> {
        tokio::spawn(async move { self.run(token).await })
    }
}
