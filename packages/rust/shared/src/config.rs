//! Application configuration for the API catalog.
//!
//! User config lives at `~/.apicatalog/apicatalog.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "apicatalog.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".apicatalog";

/// Upper bound on concurrently running adapters.
pub const MAX_PARALLEL_LAYERS: usize = 8;

// ---------------------------------------------------------------------------
// Config structs (matching apicatalog.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Collection pacing, retries and parallelism.
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Extra layers backed by local JSON catalog files.
    #[serde(default)]
    pub catalog_files: Vec<CatalogFileEntry>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Catalog database path. A leading `~/` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory export files are written to.
    #[serde(default = "default_export_dir")]
    pub export_dir: String,

    /// How many categories `statistics()` ranks.
    #[serde(default = "default_top_categories")]
    pub top_categories: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            export_dir: default_export_dir(),
            top_categories: default_top_categories(),
        }
    }
}

fn default_db_path() -> String {
    "~/.apicatalog/catalog.db".into()
}
fn default_export_dir() -> String {
    "exports".into()
}
fn default_top_categories() -> usize {
    10
}

/// `[collection]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Minimum ms between paginated requests to one provider.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Retries per request on transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential retry backoff, in ms.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Adapters allowed to run at once (1 = strictly sequential).
    #[serde(default = "default_parallel_layers")]
    pub parallel_layers: usize,

    /// Name of the env var holding a GitHub token (never store the token itself).
    #[serde(default = "default_github_token_env")]
    pub github_token_env: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            timeout_secs: default_timeout_secs(),
            parallel_layers: default_parallel_layers(),
            github_token_env: default_github_token_env(),
        }
    }
}

fn default_request_delay() -> u64 {
    1500
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_parallel_layers() -> usize {
    1
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".into()
}

/// `[[catalog_files]]` entry: binds a layer to a local JSON catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFileEntry {
    /// Layer number this file feeds (1–12).
    pub layer: u8,
    /// Human-readable source name.
    pub name: String,
    /// Path to the JSON file.
    pub path: String,
    /// Expected record count, for completion reporting.
    #[serde(default)]
    pub target_count: usize,
}

// ---------------------------------------------------------------------------
// Collect config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime collection configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// Delay between paginated requests.
    pub request_delay: Duration,
    /// Retries per request on transient failures.
    pub max_retries: u32,
    /// Base retry backoff.
    pub retry_backoff: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Adapters allowed to run at once.
    pub parallel_layers: usize,
    /// GitHub token, if the configured env var is set.
    pub github_token: Option<String>,
}

impl From<&AppConfig> for CollectConfig {
    fn from(config: &AppConfig) -> Self {
        let c = &config.collection;
        Self {
            request_delay: Duration::from_millis(c.request_delay_ms),
            max_retries: c.max_retries,
            retry_backoff: Duration::from_millis(c.retry_backoff_ms),
            timeout: Duration::from_secs(c.timeout_secs),
            parallel_layers: c.parallel_layers.clamp(1, MAX_PARALLEL_LAYERS),
            github_token: std::env::var(&c.github_token_env)
                .ok()
                .filter(|t| !t.is_empty()),
        }
    }
}

impl CollectConfig {
    /// No pacing, no retries. For tests against local mock servers.
    pub fn immediate() -> Self {
        Self {
            request_delay: Duration::ZERO,
            max_retries: 0,
            retry_backoff: Duration::ZERO,
            timeout: Duration::from_secs(5),
            parallel_layers: 1,
            github_token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.apicatalog/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| CatalogError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.apicatalog/apicatalog.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| CatalogError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject configs that would only fail later, mid-run.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    for entry in &config.catalog_files {
        if !crate::types::is_valid_layer(entry.layer) {
            return Err(CatalogError::config(format!(
                "catalog file '{}' is bound to layer {}, expected 1-12",
                entry.name, entry.layer
            )));
        }
    }
    if config.collection.parallel_layers == 0 {
        return Err(CatalogError::config("parallel_layers must be at least 1"));
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CatalogError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CatalogError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("GITHUB_TOKEN"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.collection.request_delay_ms, 1500);
        assert_eq!(parsed.defaults.top_categories, 10);
    }

    #[test]
    fn config_with_catalog_files() {
        let toml_str = r#"
[collection]
parallel_layers = 4

[[catalog_files]]
layer = 7
name = "Internal Catalog"
path = "/tmp/internal.json"
target_count = 250
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.catalog_files.len(), 1);
        assert_eq!(config.catalog_files[0].layer, 7);
        assert_eq!(config.collection.parallel_layers, 4);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn catalog_file_layer_out_of_range_is_rejected() {
        let toml_str = r#"
[[catalog_files]]
layer = 13
name = "Bad"
path = "/tmp/bad.json"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let err = validate_config(&config).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("layer 13"));
    }

    #[test]
    fn collect_config_from_app_config() {
        let mut app = AppConfig::default();
        app.collection.parallel_layers = 64;
        // Use a unique env var name to avoid interfering with other tests
        app.collection.github_token_env = "APICATALOG_TEST_NONEXISTENT_TOKEN_12345".into();
        let collect = CollectConfig::from(&app);
        assert_eq!(collect.request_delay, Duration::from_millis(1500));
        assert_eq!(collect.parallel_layers, MAX_PARALLEL_LAYERS);
        assert!(collect.github_token.is_none());
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/var/db/catalog.db"), PathBuf::from("/var/db/catalog.db"));
    }
}
