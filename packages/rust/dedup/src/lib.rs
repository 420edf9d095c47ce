//! Deduplication and reconciliation engine.
//!
//! [`normalize_url`] and [`fingerprint`] feed both stages: the
//! [`LayerDeduplicator`] filters one adapter's batch, and the
//! [`CrossSourceReconciler`] collapses duplicate URLs across the catalog.
//!
//! Everything here is pure in-memory computation; no I/O.

pub mod layer;
pub mod normalize;
pub mod reconcile;

pub use layer::{DedupeContext, LayerDedupe, LayerDeduplicator};
pub use normalize::{TRACKING_PARAMS, fingerprint, normalize_url};
pub use reconcile::{CrossSourceReconciler, Reconciliation, score};
