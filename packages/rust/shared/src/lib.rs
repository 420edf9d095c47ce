//! Record model, error taxonomy and configuration shared by every catalog crate.
//!
//! - [`CatalogError`]: source, record, persistence and configuration failures
//! - [`CatalogRecord`] with its identity key and field bounds
//! - [`AppConfig`] on disk, [`CollectConfig`] at runtime

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogFileEntry, CollectConfig, CollectionConfig, DefaultsConfig,
    MAX_PARALLEL_LAYERS, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, validate_config,
};
pub use error::{CatalogError, Result};
pub use types::{
    CatalogRecord, MAX_LAYER, MIN_LAYER, Metadata, MetadataValue, RunId, bounds, identity_key,
    is_valid_layer, truncate_chars,
};
