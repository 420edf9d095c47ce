//! Source adapter trait and the layer → adapter registry.
//!
//! Each adapter pulls candidate records from exactly one external catalog.
//! Adapters recover partial upstream failures themselves (a failed page or a
//! malformed entry only shrinks the result). An `Err` from
//! [`SourceAdapter::collect`] means the source produced nothing usable at all.

mod apis_guru;
mod catalog_file;
mod github;
mod public_apis;

use apicatalog_shared::{
    CatalogError, CatalogFileEntry, CatalogRecord, CollectConfig, MAX_LAYER, MIN_LAYER, Result,
    is_valid_layer,
};
use async_trait::async_trait;

pub use apis_guru::ApisGuruAdapter;
pub use catalog_file::CatalogFileAdapter;
pub use github::GitHubAdapter;
pub use public_apis::PublicApisAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Records gathered by one `collect()` call.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// Normalized candidate records.
    pub records: Vec<CatalogRecord>,
    /// Entries discarded during normalization (missing url or name).
    pub dropped: usize,
    /// Partial failures that were recovered (failed page, bad entry).
    pub warnings: Vec<String>,
}

impl Collected {
    /// Add a normalized record, dropping it if a required field is empty.
    pub fn push(&mut self, record: CatalogRecord) {
        if record.has_required_fields() {
            self.records.push(record);
        } else {
            self.dropped += 1;
        }
    }

    /// Note a recovered partial failure.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "partial collection failure");
        self.warnings.push(message);
    }
}

/// Contract for one external catalog.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Human-readable source name for reports and tracing.
    fn name(&self) -> &str;

    /// Expected number of records, used for completion percentages.
    fn target_count(&self) -> usize;

    /// Gather candidate records.
    async fn collect(&self) -> Result<Collected>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Static layer-number → adapter table.
///
/// Adapters live in an arena; each layer slot holds an index into it.
pub struct SourceRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
    slots: [Option<usize>; MAX_LAYER as usize],
}

impl SourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            slots: [None; MAX_LAYER as usize],
        }
    }

    /// Registry with the built-in network adapters (layers 1–3) plus any
    /// configured catalog files.
    pub fn with_builtin(config: &CollectConfig, files: &[CatalogFileEntry]) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(1, Box::new(ApisGuruAdapter::new(config)?))?;
        registry.register(2, Box::new(PublicApisAdapter::new(config)?))?;
        registry.register(3, Box::new(GitHubAdapter::new(config)?))?;
        for entry in files {
            registry.register(entry.layer, Box::new(CatalogFileAdapter::from_entry(entry)))?;
        }
        Ok(registry)
    }

    /// Bind `adapter` to `layer`. Fails on an out-of-range or taken layer.
    pub fn register(&mut self, layer: u8, adapter: Box<dyn SourceAdapter>) -> Result<()> {
        if !is_valid_layer(layer) {
            return Err(CatalogError::config(format!(
                "cannot register '{}' on layer {layer}: expected {MIN_LAYER}-{MAX_LAYER}",
                adapter.name()
            )));
        }
        let slot = &mut self.slots[usize::from(layer - 1)];
        if let Some(existing) = slot {
            return Err(CatalogError::config(format!(
                "layer {layer} already bound to '{}'",
                self.adapters[*existing].name()
            )));
        }
        *slot = Some(self.adapters.len());
        self.adapters.push(adapter);
        Ok(())
    }

    /// The adapter bound to `layer`, if any.
    pub fn get(&self, layer: u8) -> Option<&dyn SourceAdapter> {
        if !is_valid_layer(layer) {
            return None;
        }
        self.slots[usize::from(layer - 1)].map(|i| self.adapters[i].as_ref())
    }

    /// Whether `layer` has an adapter.
    pub fn contains(&self, layer: u8) -> bool {
        self.get(layer).is_some()
    }

    /// Registered layer numbers, ascending.
    pub fn layers(&self) -> Vec<u8> {
        (MIN_LAYER..=MAX_LAYER).filter(|&l| self.contains(l)).collect()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Empty string for `None`, trimmed text otherwise.
pub(crate) fn text(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}
