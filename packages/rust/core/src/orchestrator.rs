//! Collection run: adapters → in-layer dedup → store → reconciliation.
//!
//! Layers run in request order; with `parallel_layers > 1` up to that many
//! adapters run at once, and reports still come back in request order. A
//! failing or panicking adapter fails its own layer only. Unknown layers
//! are rejected before anything starts.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use apicatalog_dedup::{CrossSourceReconciler, LayerDedupe, LayerDeduplicator};
use apicatalog_shared::{CatalogError, CollectConfig, Result, RunId};
use apicatalog_sources::{SourceAdapter, SourceRegistry};
use apicatalog_storage::CatalogStore;
use futures::{FutureExt, StreamExt, stream};
use tracing::{info, instrument, warn};

use crate::report::{LayerReport, LayerState, ReconcileSummary, RunReport, RunTotals};

// ---------------------------------------------------------------------------
// Options, cancellation, progress
// ---------------------------------------------------------------------------

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Adapters allowed to run at once; 1 = strictly sequential.
    pub parallel_layers: usize,
    /// Categories listed in the post-run statistics.
    pub top_categories: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallel_layers: 1,
            top_categories: 10,
        }
    }
}

impl From<&CollectConfig> for RunOptions {
    fn from(config: &CollectConfig) -> Self {
        Self {
            parallel_layers: config.parallel_layers,
            ..Self::default()
        }
    }
}

/// Cooperative cancellation flag, checked before each layer starts.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Layers already running finish normally.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a layer's adapter starts collecting.
    fn layer_started(&self, layer: u8, name: &str);
    /// Called when a layer reaches a terminal state.
    fn layer_finished(&self, report: &LayerReport);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn layer_started(&self, _layer: u8, _name: &str) {}
    fn layer_finished(&self, _report: &LayerReport) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives collection runs over a [`SourceRegistry`].
pub struct Orchestrator {
    registry: SourceRegistry,
    options: RunOptions,
    cancel: CancelSignal,
}

impl Orchestrator {
    pub fn new(registry: SourceRegistry, options: RunOptions) -> Self {
        Self {
            registry,
            options,
            cancel: CancelSignal::new(),
        }
    }

    /// Share an externally owned cancellation flag (e.g. wired to Ctrl-C).
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the requested layers, then one reconciliation pass.
    ///
    /// Returns `Err` only for configuration problems found before any layer
    /// starts, or when the run lock cannot be taken. Layer, record and reconciliation failures are reported in the
    /// returned [`RunReport`].
    #[instrument(skip_all, fields(layers = ?layers))]
    pub async fn run(
        &self,
        store: &CatalogStore,
        layers: &[u8],
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        self.validate(layers)?;

        let start = Instant::now();
        let run_id = RunId::new();
        let parallel = self.options.parallel_layers.max(1);
        info!(%run_id, layers = ?layers, parallel, "starting collection run");

        let _cycle = store.begin_cycle().await?;

        progress.phase("Collecting layers");
        let reports: Vec<LayerReport> = stream::iter(layers.iter().copied())
            .map(|layer| self.run_layer(store, layer, progress))
            .buffered(parallel)
            .collect()
            .await;

        progress.phase("Reconciling catalog");
        let reconciliation = reconcile_locked(store).await.unwrap_or_else(|e| {
            warn!(error = %e, "reconciliation failed");
            ReconcileSummary {
                error: Some(e.to_string()),
                ..ReconcileSummary::default()
            }
        });

        let statistics = match store.statistics(self.options.top_categories).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "could not read catalog statistics");
                None
            }
        };

        let totals = RunTotals::from_layers(&reports);
        let report = RunReport {
            run_id,
            layers: reports,
            totals,
            reconciliation,
            statistics,
            cancelled: self.cancel.is_cancelled(),
            duration: start.elapsed(),
        };

        let failed: Vec<u8> = report.failed_layers().iter().map(|l| l.layer).collect();
        info!(
            run_id = %report.run_id,
            collected = report.totals.collected,
            unique = report.totals.unique,
            saved = report.totals.saved,
            target = report.totals.target,
            completion_pct = %format!("{:.1}", report.totals.completion_pct),
            duplicates = report.totals.duplicates,
            dropped = report.totals.dropped,
            rejected = report.totals.rejected,
            failed_records = report.totals.failed,
            failed_layers = ?failed,
            cancelled = report.cancelled,
            duration_ms = report.duration.as_millis() as u64,
            "collection run finished"
        );
        progress.done(&report);
        Ok(report)
    }

    fn validate(&self, layers: &[u8]) -> Result<()> {
        if layers.is_empty() {
            return Err(CatalogError::config("no layers selected"));
        }
        if let Some(unknown) = layers.iter().find(|&&l| !self.registry.contains(l)) {
            return Err(CatalogError::config(format!(
                "unknown layer {unknown} (registered: {:?})",
                self.registry.layers()
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, store, progress))]
    async fn run_layer(
        &self,
        store: &CatalogStore,
        layer: u8,
        progress: &dyn ProgressReporter,
    ) -> LayerReport {
        let Some(adapter) = self.registry.get(layer) else {
            let mut report = LayerReport::pending(layer, "unregistered", 0);
            report.fail("no adapter bound to layer", Default::default());
            return report;
        };
        let mut report = LayerReport::pending(layer, adapter.name(), adapter.target_count());

        if self.cancel.is_cancelled() {
            info!(layer, "cancelled before start");
            return report;
        }

        let started = Instant::now();
        progress.layer_started(layer, adapter.name());

        report.advance(LayerState::Collecting);
        let collected = match collect_guarded(adapter).await {
            Ok(collected) => collected,
            Err(error) => {
                warn!(layer, source = adapter.name(), %error, "layer failed");
                report.fail(error, started.elapsed());
                progress.layer_finished(&report);
                return report;
            }
        };
        report.collected = collected.records.len();
        report.dropped = collected.dropped;
        report.warnings = collected.warnings;

        report.advance(LayerState::LayerDeduping);
        let LayerDedupe {
            records,
            duplicates,
        } = LayerDeduplicator.dedupe(collected.records);
        report.unique = records.len();
        report.duplicates = duplicates;

        report.advance(LayerState::Persisting);
        let outcome = store.bulk_upsert(&records, layer).await;
        report.saved = outcome.saved;
        report.rejected = outcome.invalid;
        report.failed = outcome.failed;

        report.complete(started.elapsed());
        info!(
            layer,
            source = %report.name,
            collected = report.collected,
            unique = report.unique,
            saved = report.saved,
            target = report.target,
            completion_pct = %format!("{:.1}", report.completion_pct),
            duration_ms = report.duration.as_millis() as u64,
            "layer completed"
        );
        progress.layer_finished(&report);
        report
    }
}

/// Call `collect()`, turning both an `Err` and a panic into an error message.
async fn collect_guarded(
    adapter: &dyn SourceAdapter,
) -> std::result::Result<apicatalog_sources::Collected, String> {
    match AssertUnwindSafe(adapter.collect()).catch_unwind().await {
        Ok(Ok(collected)) => Ok(collected),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            Err(format!("adapter panicked: {message}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Run one reconciliation pass over the whole catalog, outside a collection
/// run. Waits for any active run to finish.
#[instrument(skip_all)]
pub async fn reconcile_catalog(store: &CatalogStore) -> Result<ReconcileSummary> {
    let _cycle = store.begin_cycle().await?;
    reconcile_locked(store).await
}

async fn reconcile_locked(store: &CatalogStore) -> Result<ReconcileSummary> {
    let records = store.snapshot().await?;
    let examined = records.len();
    let plan = CrossSourceReconciler.reconcile(records);

    let applied = if plan.is_noop() {
        Default::default()
    } else {
        store.apply_reconciliation(&plan).await?
    };

    info!(
        examined,
        groups_merged = plan.groups_merged,
        removed = applied.removed,
        updated = applied.updated,
        "catalog reconciled"
    );
    Ok(ReconcileSummary {
        examined,
        groups_merged: plan.groups_merged,
        removed: applied.removed,
        updated: applied.updated,
        error: None,
    })
}
