//! Core domain types for the API catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Lowest valid layer number.
pub const MIN_LAYER: u8 = 1;

/// Highest valid layer number.
pub const MAX_LAYER: u8 = 12;

// ---------------------------------------------------------------------------
// Field bounds
// ---------------------------------------------------------------------------

/// Maximum stored length, in characters, of each text field.
pub mod bounds {
    pub const NAME: usize = 500;
    pub const DESCRIPTION: usize = 1000;
    pub const URL: usize = 500;
    pub const SOURCE: usize = 100;
    pub const CATEGORY: usize = 100;
    pub const AUTH: usize = 50;
    pub const REGION: usize = 50;
}

/// Whether `layer` lies in the supported `[1, 12]` range.
pub fn is_valid_layer(layer: u8) -> bool {
    (MIN_LAYER..=MAX_LAYER).contains(&layer)
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for collection run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// A scalar metadata value attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Open string-keyed metadata map. Ordered so serialized output is stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

// ---------------------------------------------------------------------------
// CatalogRecord
// ---------------------------------------------------------------------------

/// One API description, in the flat wire shape shared by adapters, the store
/// and exporters: `{name, desc, url, source, category, auth, region, layer, metadata}`.
///
/// Every field may be missing or empty on records straight out of an adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRecord {
    pub name: String,
    #[serde(rename = "desc")]
    pub description: String,
    pub url: String,
    pub source: String,
    pub category: String,
    #[serde(rename = "auth")]
    pub auth_method: String,
    pub region: String,
    pub layer: u8,
    pub metadata: Metadata,
}

impl CatalogRecord {
    /// Create a record with the two required fields set.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Deterministic primary key: SHA-256 over lowercased `url|name`.
    pub fn identity_key(&self) -> String {
        identity_key(&self.url, &self.name)
    }

    /// Whether the fields the store requires (url, name) are present.
    pub fn has_required_fields(&self) -> bool {
        !self.url.trim().is_empty() && !self.name.trim().is_empty()
    }

    /// Clip every text field to its storage bound (character-aware).
    pub fn truncate_fields(&mut self) {
        truncate_chars(&mut self.name, bounds::NAME);
        truncate_chars(&mut self.description, bounds::DESCRIPTION);
        truncate_chars(&mut self.url, bounds::URL);
        truncate_chars(&mut self.source, bounds::SOURCE);
        truncate_chars(&mut self.category, bounds::CATEGORY);
        truncate_chars(&mut self.auth_method, bounds::AUTH);
        truncate_chars(&mut self.region, bounds::REGION);
    }
}

/// Identity key for a `(url, name)` pair.
pub fn identity_key(url: &str, name: &str) -> String {
    let material = format!("{}|{}", url.trim(), name.trim()).to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Truncate `s` in place to at most `max` characters.
pub fn truncate_chars(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}
