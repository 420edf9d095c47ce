//! Local JSON catalog adapter, bound to any free layer through config.
//!
//! Accepts either a bare array of wire-shape records or an
//! `{ "apis": [...] }` envelope (the shape the JSON exporter writes).

use std::path::PathBuf;

use apicatalog_shared::{CatalogError, CatalogFileEntry, CatalogRecord, Result, expand_home};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument};

use super::{Collected, SourceAdapter};

pub struct CatalogFileAdapter {
    name: String,
    path: PathBuf,
    target_count: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FileShape {
    Bare(Vec<serde_json::Value>),
    Envelope { apis: Vec<serde_json::Value> },
}

impl CatalogFileAdapter {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, target_count: usize) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            target_count,
        }
    }

    /// Build from a `[[catalog_files]]` config entry (`~` is expanded).
    pub fn from_entry(entry: &CatalogFileEntry) -> Self {
        Self::new(entry.name.clone(), expand_home(&entry.path), entry.target_count)
    }
}

#[async_trait]
impl SourceAdapter for CatalogFileAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn target_count(&self) -> usize {
        self.target_count
    }

    #[instrument(skip_all)]
    async fn collect(&self) -> Result<Collected> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CatalogError::source_unavailable(&self.name, format!("{}: {e}", self.path.display())))?;
        let shape: FileShape = serde_json::from_str(&raw).map_err(|e| {
            CatalogError::source_unavailable(&self.name, format!("{}: not a catalog file: {e}", self.path.display()))
        })?;
        let items = match shape {
            FileShape::Bare(items) | FileShape::Envelope { apis: items } => items,
        };

        let mut out = Collected::default();
        for (index, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<CatalogRecord>(item) {
                Ok(mut record) => {
                    if record.source.trim().is_empty() {
                        record.source = self.name.clone();
                    }
                    out.push(record);
                }
                Err(e) => out.warn(format!("entry {index}: {e}")),
            }
        }

        info!(
            source = %self.name,
            path = %self.path.display(),
            records = out.records.len(),
            dropped = out.dropped,
            "catalog file collected"
        );
        Ok(out)
    }
}
