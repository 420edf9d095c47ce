//! Collection orchestration for the API catalog.
//!
//! This crate ties adapters, in-layer deduplication, the catalog store and
//! cross-source reconciliation into collection runs, and exports the
//! catalog, filtered slices of it and progress reports to files.

pub mod export;
pub mod orchestrator;
pub mod report;
pub mod selection;

pub use export::{
    ExecutiveSummary, ExportFilter, ExportFormat, ExportSummary, LayerPerformance, LayerStatus,
    SummaryReport, export, export_filtered, export_summary_report,
};
pub use orchestrator::{
    CancelSignal, Orchestrator, ProgressReporter, RunOptions, SilentProgress, reconcile_catalog,
};
pub use report::{LayerReport, LayerState, ReconcileSummary, RunReport, RunTotals};
pub use selection::parse_layer_selection;
