//! APIs.guru OpenAPI directory adapter (layer 1).
//!
//! Reads the single `list.json` index: an object keyed by API id, each entry
//! carrying its versions and the preferred one.

use std::collections::BTreeMap;

use apicatalog_shared::{CatalogError, CatalogRecord, CollectConfig, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument};
use url::Url;

use super::{Collected, SourceAdapter, text};
use crate::client::SourceClient;

const DEFAULT_BASE_URL: &str = "https://api.apis.guru";
const SOURCE: &str = "apis.guru";

/// Adapter for the APIs.guru directory.
pub struct ApisGuruAdapter {
    client: SourceClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GuruEntry {
    #[serde(default)]
    added: Option<String>,
    #[serde(default)]
    preferred: Option<String>,
    #[serde(default)]
    versions: BTreeMap<String, GuruVersion>,
}

#[derive(Debug, Deserialize)]
struct GuruVersion {
    #[serde(default)]
    info: GuruInfo,
    #[serde(default, rename = "swaggerUrl")]
    swagger_url: Option<String>,
    #[serde(default, rename = "openapiVer")]
    openapi_ver: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GuruInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "x-apisguru-categories")]
    categories: Vec<String>,
    #[serde(default, rename = "x-providerName")]
    provider: Option<String>,
}

impl ApisGuruAdapter {
    /// Create the adapter against the public APIs.guru endpoint.
    pub fn new(config: &CollectConfig) -> Result<Self> {
        Ok(Self {
            client: SourceClient::new(config)?,
            base_url: DEFAULT_BASE_URL.into(),
        })
    }

    /// Point the adapter at another host (mirrors, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn list_url(&self) -> Result<Url> {
        Url::parse(&format!("{}/v2/list.json", self.base_url.trim_end_matches('/')))
            .map_err(|e| CatalogError::config(format!("invalid apis.guru base url: {e}")))
    }
}

#[async_trait]
impl SourceAdapter for ApisGuruAdapter {
    fn name(&self) -> &str {
        "APIs.guru Directory"
    }

    fn target_count(&self) -> usize {
        2500
    }

    #[instrument(skip_all, fields(source = SOURCE))]
    async fn collect(&self) -> Result<Collected> {
        let url = self.list_url()?;
        let index: BTreeMap<String, serde_json::Value> = self
            .client
            .get_json(&url)
            .await
            .map_err(|e| CatalogError::source_unavailable(SOURCE, e.to_string()))?;

        let mut out = Collected::default();
        for (api_id, raw) in index {
            match serde_json::from_value::<GuruEntry>(raw) {
                Ok(entry) => {
                    if let Some(record) = to_record(&api_id, entry) {
                        out.push(record);
                    } else {
                        out.dropped += 1;
                    }
                }
                Err(e) => out.warn(format!("{api_id}: malformed entry: {e}")),
            }
        }

        info!(records = out.records.len(), dropped = out.dropped, "apis.guru collected");
        Ok(out)
    }
}

fn to_record(api_id: &str, entry: GuruEntry) -> Option<CatalogRecord> {
    let GuruEntry {
        added,
        preferred,
        mut versions,
    } = entry;

    let version_key = preferred
        .filter(|p| versions.contains_key(p))
        .or_else(|| versions.keys().next_back().cloned())?;
    let version = versions.remove(&version_key)?;

    let name = version
        .info
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(api_id)
        .trim()
        .to_string();

    let mut record = CatalogRecord {
        name,
        description: text(version.info.description.as_deref()),
        url: text(version.swagger_url.as_deref().or(version.link.as_deref())),
        source: SOURCE.into(),
        category: version.info.categories.first().cloned().unwrap_or_default(),
        region: "Global".into(),
        ..CatalogRecord::default()
    };

    let metadata = &mut record.metadata;
    metadata.insert("api_id".into(), api_id.into());
    metadata.insert("version".into(), version_key.into());
    if let Some(provider) = version.info.provider {
        metadata.insert("provider".into(), provider.into());
    }
    if let Some(ver) = version.openapi_ver {
        metadata.insert("openapi_version".into(), ver.into());
    }
    if let Some(updated) = version.updated {
        metadata.insert("updated".into(), updated.into());
    }
    if let Some(added) = added {
        metadata.insert("added".into(), added.into());
    }
    if version.info.categories.len() > 1 {
        metadata.insert("categories".into(), version.info.categories.join(",").into());
    }

    Some(record)
}
