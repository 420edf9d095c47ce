//! Structured run reports.
//!
//! Every collection run yields a [`RunReport`]: one [`LayerReport`] per
//! requested layer (in request order), aggregate totals, and the outcome of
//! the reconciliation pass. Failures are data here, not log lines.

use std::fmt;
use std::time::Duration;

use apicatalog_shared::RunId;
use apicatalog_storage::CatalogStatistics;
use serde::Serialize;

/// Per-layer lifecycle state.
///
/// `Pending → Collecting → LayerDeduping → Persisting → {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayerState {
    Pending,
    Collecting,
    LayerDeduping,
    Persisting,
    Completed,
    Failed,
}

impl LayerState {
    /// Whether the layer has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for LayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Collecting => "COLLECTING",
            Self::LayerDeduping => "LAYER_DEDUPING",
            Self::Persisting => "PERSISTING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        })
    }
}

/// Metrics and outcome for one layer.
#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    pub layer: u8,
    /// Adapter name.
    pub name: String,
    pub state: LayerState,
    /// Records returned by the adapter.
    pub collected: usize,
    /// Records surviving in-layer deduplication.
    pub unique: usize,
    /// Records removed by in-layer deduplication.
    pub duplicates: usize,
    /// Entries the adapter discarded for a missing url or name.
    pub dropped: usize,
    /// Rows persisted.
    pub saved: usize,
    /// Records the store rejected as invalid.
    pub rejected: usize,
    /// Records whose write failed.
    pub failed: usize,
    /// Adapter target count.
    pub target: usize,
    /// `saved / target` as a percentage.
    pub completion_pct: f64,
    pub duration: Duration,
    /// Why the layer failed, if it did.
    pub error: Option<String>,
    /// Partial failures the adapter recovered from.
    pub warnings: Vec<String>,
}

impl LayerReport {
    /// A report for a layer that has not started.
    pub fn pending(layer: u8, name: impl Into<String>, target: usize) -> Self {
        Self {
            layer,
            name: name.into(),
            state: LayerState::Pending,
            collected: 0,
            unique: 0,
            duplicates: 0,
            dropped: 0,
            saved: 0,
            rejected: 0,
            failed: 0,
            target,
            completion_pct: 0.0,
            duration: Duration::ZERO,
            error: None,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn advance(&mut self, next: LayerState) {
        tracing::debug!(layer = self.layer, from = %self.state, to = %next, "layer state");
        self.state = next;
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>, elapsed: Duration) {
        self.advance(LayerState::Failed);
        self.error = Some(error.into());
        self.duration = elapsed;
    }

    pub(crate) fn complete(&mut self, elapsed: Duration) {
        self.advance(LayerState::Completed);
        self.completion_pct = completion(self.saved, self.target);
        self.duration = elapsed;
    }
}

/// Sums across all layer reports.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunTotals {
    pub collected: usize,
    pub unique: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub saved: usize,
    pub rejected: usize,
    pub failed: usize,
    pub target: usize,
    /// `total saved / total target` as a percentage.
    pub completion_pct: f64,
}

impl RunTotals {
    pub fn from_layers(layers: &[LayerReport]) -> Self {
        let mut totals = layers.iter().fold(Self::default(), |mut acc, l| {
            acc.collected += l.collected;
            acc.unique += l.unique;
            acc.duplicates += l.duplicates;
            acc.dropped += l.dropped;
            acc.saved += l.saved;
            acc.rejected += l.rejected;
            acc.failed += l.failed;
            acc.target += l.target;
            acc
        });
        totals.completion_pct = completion(totals.saved, totals.target);
        totals
    }
}

/// Outcome of the catalog-wide reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    /// Rows read from the store.
    pub examined: usize,
    /// Duplicate-URL groups collapsed.
    pub groups_merged: usize,
    /// Superseded rows deleted.
    pub removed: u64,
    /// Canonical rows whose merged metadata was written back.
    pub updated: u64,
    /// Set when the pass could not be applied.
    pub error: Option<String>,
}

/// Everything a collection run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    /// One entry per requested layer, in request order.
    pub layers: Vec<LayerReport>,
    pub totals: RunTotals,
    pub reconciliation: ReconcileSummary,
    /// Catalog statistics after the run, when they could be read.
    pub statistics: Option<CatalogStatistics>,
    /// Whether a cancellation stopped layers from starting.
    pub cancelled: bool,
    pub duration: Duration,
}

impl RunReport {
    /// Layers that ended in [`LayerState::Failed`].
    pub fn failed_layers(&self) -> Vec<&LayerReport> {
        self.layers
            .iter()
            .filter(|l| l.state == LayerState::Failed)
            .collect()
    }

    /// Layers that never started.
    pub fn pending_layers(&self) -> Vec<&LayerReport> {
        self.layers
            .iter()
            .filter(|l| l.state == LayerState::Pending)
            .collect()
    }

    /// Report for `layer`, if it was requested.
    pub fn layer(&self, layer: u8) -> Option<&LayerReport> {
        self.layers.iter().find(|l| l.layer == layer)
    }
}

fn completion(saved: usize, target: usize) -> f64 {
    if target == 0 {
        0.0
    } else {
        saved as f64 / target as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(layer: u8, saved: usize, target: usize) -> LayerReport {
        let mut r = LayerReport::pending(layer, format!("layer {layer}"), target);
        r.collected = saved + 2;
        r.unique = saved;
        r.duplicates = 2;
        r.saved = saved;
        r.complete(Duration::from_millis(5));
        r
    }

    #[test]
    fn completion_is_saved_over_target() {
        let r = finished(1, 50, 200);
        assert_eq!(r.state, LayerState::Completed);
        assert!((r.completion_pct - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn totals_sum_layers_including_failed_targets() {
        let mut failed = LayerReport::pending(3, "broken", 100);
        failed.fail("boom", Duration::ZERO);
        let layers = vec![finished(1, 30, 100), failed, finished(2, 70, 100)];

        let totals = RunTotals::from_layers(&layers);
        assert_eq!(totals.saved, 100);
        assert_eq!(totals.target, 300);
        assert_eq!(totals.duplicates, 4);
        assert!((totals.completion_pct - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn zero_target_has_zero_completion() {
        let r = finished(4, 10, 0);
        assert_eq!(r.completion_pct, 0.0);
    }

    #[test]
    fn state_names_match_serialized_form() {
        assert_eq!(LayerState::LayerDeduping.to_string(), "LAYER_DEDUPING");
        assert_eq!(
            serde_json::to_string(&LayerState::LayerDeduping).unwrap(),
            "\"LAYER_DEDUPING\""
        );
        assert!(LayerState::Failed.is_terminal());
        assert!(!LayerState::Persisting.is_terminal());
    }
}
