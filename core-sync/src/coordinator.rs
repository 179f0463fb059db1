//! # Sync Coordinator
//!
//! Orchestrates a whole run: discovery, per-item pipeline execution
//! (sequentially or over a bounded worker pool), result aggregation, and the
//! teardown contract.
//!
//! ## Workflow
//!
//! 1. Validate configuration and open the ledgers (ledger corruption aborts
//!    startup here, before any remote call)
//! 2. Discover `(sku, manifest)` pairs in the configured order
//! 3. Dispatch items: one at a time on the calling task, or through a
//!    bounded pool of workers fed by a work queue, results gathered over a
//!    result channel
//! 4. Re-sort parallel results by SKU — completion order is not
//!    deterministic, reporting must be
//! 5. Tear down on every exit path: release locks, flush ledgers, drop the
//!    transport
//!
//! ## Cancellation
//!
//! Shutdown is cooperative via a [`CancellationToken`]: sequential mode
//! checks it between items, parallel workers check it before dequeuing. The
//! in-flight item always finishes; there is no forced cancellation of
//! remote calls.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bridge_traits::catalog::{CatalogProvider, HealthReport};
use bridge_traits::error::{Result, SyncError};
use bridge_traits::time::{Clock, SystemClock};
use core_manifest::{ItemManifest, ManifestSource};
use core_runtime::events::{EventBus, SyncEvent};

use crate::config::SyncConfig;
use crate::ledger::{ExecutionLedger, MediaLedger};
use crate::lock::LockManager;
use crate::media::MediaHandler;
use crate::outcome::{ItemOutcome, OutcomeReason, RunSummary, SyncAction};
use crate::pipeline::ItemPipeline;
use crate::rate_limit::RateLimitedExecutor;
use crate::remote::RemoteGateway;
use crate::retry::RetryHandler;

/// Everything a finished run produced.
#[derive(Debug)]
pub struct SyncRunReport {
    pub outcomes: Vec<ItemOutcome>,
    pub summary: RunSummary,
}

/// Central orchestrator for catalog synchronization runs.
pub struct SyncCoordinator {
    config: SyncConfig,
    provider: Arc<dyn CatalogProvider>,
    source: Arc<dyn ManifestSource>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    cancellation: CancellationToken,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        provider: Arc<dyn CatalogProvider>,
        source: Arc<dyn ManifestSource>,
    ) -> Self {
        Self {
            config,
            provider,
            source,
            clock: Arc::new(SystemClock),
            events: EventBus::default(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Inject a deterministic clock (tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an event bus with subscribers.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Token observed between items; cancel it to request graceful shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Probe provider authentication and endpoint reachability.
    pub async fn health_check(&self) -> Result<HealthReport> {
        self.provider.health_check().await
    }

    /// Execute a full run to completion (or graceful shutdown).
    pub async fn run(&self) -> Result<SyncRunReport> {
        let config_errors = self.config.validate();
        if !config_errors.is_empty() {
            return Err(SyncError::validation(
                "",
                "config",
                config_errors.join("; "),
            ));
        }

        let started = Instant::now();

        // Ledger corruption is intentionally fatal here: silently dropping
        // ledger state risks duplicate remote writes.
        let ledger = Arc::new(
            ExecutionLedger::open(
                self.config.ledger.path.clone(),
                self.config.ledger.corruption_policy,
                Arc::clone(&self.clock),
            )
            .await?,
        );

        let incomplete = ledger.incomplete_skus().await;
        if !incomplete.is_empty() {
            warn!(
                count = incomplete.len(),
                "previous run left incomplete items; they will re-sync on fingerprint mismatch"
            );
        }

        let media_ledger = Arc::new(
            MediaLedger::open(self.config.media.ledger_path.clone(), Arc::clone(&self.clock))
                .await,
        );

        let lock_dir = self
            .config
            .ledger
            .path
            .parent()
            .map(|parent| parent.join("locks"))
            .unwrap_or_else(|| "locks".into());
        let locks = Arc::new(LockManager::new(lock_dir, self.config.lock.clone()));

        let executor = RateLimitedExecutor::new(
            &self.config.rate_limit,
            self.config.backpressure.clone(),
            Arc::clone(&self.clock),
        );
        let retry = RetryHandler::new(self.config.retry.clone());
        let gateway = Arc::new(RemoteGateway::new(
            Arc::clone(&self.provider),
            executor,
            retry,
        ));

        let media = MediaHandler::new(
            self.config.media.clone(),
            Arc::clone(&gateway),
            Arc::clone(&media_ledger),
            self.config.paths.catalog_root.clone(),
        );

        let pipeline = Arc::new(ItemPipeline::new(
            self.config.clone(),
            Arc::clone(&gateway),
            Arc::clone(&ledger),
            media,
        ));

        let manifests = self.source.discover().await?;
        info!(count = manifests.len(), "discovered manifests");
        self.events.emit(SyncEvent::RunStarted {
            total_items: manifests.len(),
            dry_run: self.config.execution.dry_run,
        });

        let result = if self.config.execution.concurrency > 1 {
            self.run_parallel(manifests, Arc::clone(&pipeline), Arc::clone(&locks))
                .await
        } else {
            self.run_sequential(manifests, Arc::clone(&pipeline), Arc::clone(&locks))
                .await
        };

        // Teardown runs on every exit path, in order: locks, ledgers,
        // transport (dropped with the gateway when the run ends).
        locks.release_all().await;
        if let Err(e) = ledger.flush().await {
            warn!(error = %e, "execution ledger flush failed during teardown");
        }
        if let Err(e) = media_ledger.save().await {
            warn!(error = %e, "media ledger save failed during teardown");
        }

        let outcomes = result?;
        let summary = RunSummary::from_outcomes(&outcomes, self.config.execution.dry_run);
        self.events.emit(SyncEvent::RunCompleted {
            total: summary.total,
            failed: summary.failed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });

        info!(
            total = summary.total,
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "run complete"
        );

        Ok(SyncRunReport { outcomes, summary })
    }

    async fn run_sequential(
        &self,
        manifests: Vec<(String, ItemManifest)>,
        pipeline: Arc<ItemPipeline>,
        locks: Arc<LockManager>,
    ) -> Result<Vec<ItemOutcome>> {
        let mut outcomes = Vec::with_capacity(manifests.len());

        for (sku, manifest) in manifests {
            if self.config.signals.graceful_shutdown && self.cancellation.is_cancelled() {
                info!("shutdown requested, stopping before next item");
                self.events.emit(SyncEvent::ShutdownRequested);
                break;
            }

            self.events.emit(SyncEvent::ItemStarted { sku: sku.clone() });
            let outcome = process_locked(&pipeline, &locks, &sku, &manifest).await?;
            self.events.emit(SyncEvent::ItemCompleted {
                sku: sku.clone(),
                action: outcome.action.as_str().to_string(),
            });
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    async fn run_parallel(
        &self,
        manifests: Vec<(String, ItemManifest)>,
        pipeline: Arc<ItemPipeline>,
        locks: Arc<LockManager>,
    ) -> Result<Vec<ItemOutcome>> {
        let total = manifests.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let workers = self.config.execution.concurrency.min(total);
        let (work_tx, work_rx) = mpsc::channel::<(String, ItemManifest)>(total);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<Result<ItemOutcome>>(total);

        for (sku, manifest) in manifests {
            // capacity == total, send cannot block
            work_tx
                .send((sku, manifest))
                .await
                .expect("work queue closed before dispatch");
        }
        drop(work_tx);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let pipeline = Arc::clone(&pipeline);
            let locks = Arc::clone(&locks);
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let events = self.events.clone();
            let cancellation = self.cancellation.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    // observed only between items; in-flight work always
                    // finishes
                    if cancellation.is_cancelled() {
                        break;
                    }

                    let next = { work_rx.lock().await.recv().await };
                    let Some((sku, manifest)) = next else {
                        break;
                    };

                    events.emit(SyncEvent::ItemStarted { sku: sku.clone() });
                    let result = process_locked(&pipeline, &locks, &sku, &manifest).await;
                    if let Ok(outcome) = &result {
                        events.emit(SyncEvent::ItemCompleted {
                            sku: sku.clone(),
                            action: outcome.action.as_str().to_string(),
                        });
                    }
                    if result_tx.send(result).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let mut outcomes = Vec::with_capacity(total);
        let mut fatal: Option<SyncError> = None;
        while let Some(result) = result_rx.recv().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    // fatal condition: stop dispatching, let workers drain
                    if fatal.is_none() {
                        self.cancellation.cancel();
                        fatal = Some(e);
                    }
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "sync worker panicked");
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        // completion order is unordered; reporting must not be
        outcomes.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(outcomes)
    }
}

/// Run the pipeline under the item's lock. A lock timeout becomes the
/// item's outcome; it is never retried.
async fn process_locked(
    pipeline: &ItemPipeline,
    locks: &LockManager,
    sku: &str,
    manifest: &ItemManifest,
) -> Result<ItemOutcome> {
    match locks.with_lock(sku, || pipeline.process(manifest)).await {
        Ok(inner) => inner,
        Err(lock_error) => {
            let mut outcome =
                ItemOutcome::new(sku, SyncAction::Failed).with_reason(OutcomeReason::Error);
            outcome.errors.push(lock_error.to_report());
            Ok(outcome)
        }
    }
}
