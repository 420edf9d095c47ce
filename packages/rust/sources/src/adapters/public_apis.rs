//! Public APIs adapter (layer 2).

use apicatalog_shared::{CatalogError, CatalogRecord, CollectConfig, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument};
use url::Url;

use super::{Collected, SourceAdapter, text};
use crate::client::SourceClient;

const DEFAULT_BASE_URL: &str = "https://api.publicapis.org";
const SOURCE_PREFIX: &str = "publicapis.org";

/// Adapter for the community-maintained public APIs list.
pub struct PublicApisAdapter {
    client: SourceClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct EntriesResponse {
    #[serde(default)]
    entries: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Entry {
    #[serde(rename = "API")]
    api: Option<String>,
    description: Option<String>,
    auth: Option<String>,
    #[serde(rename = "HTTPS")]
    https: Option<bool>,
    cors: Option<String>,
    link: Option<String>,
    category: Option<String>,
}

impl PublicApisAdapter {
    pub fn new(config: &CollectConfig) -> Result<Self> {
        Ok(Self {
            client: SourceClient::new(config)?,
            base_url: DEFAULT_BASE_URL.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn entries_url(&self) -> Result<Url> {
        Url::parse(&format!("{}/entries", self.base_url.trim_end_matches('/')))
            .map_err(|e| CatalogError::config(format!("invalid publicapis base url: {e}")))
    }
}

#[async_trait]
impl SourceAdapter for PublicApisAdapter {
    fn name(&self) -> &str {
        "Public APIs"
    }

    fn target_count(&self) -> usize {
        1400
    }

    #[instrument(skip_all, fields(source = SOURCE_PREFIX))]
    async fn collect(&self) -> Result<Collected> {
        let url = self.entries_url()?;
        let response: EntriesResponse = self
            .client
            .get_json(&url)
            .await
            .map_err(|e| CatalogError::source_unavailable(SOURCE_PREFIX, e.to_string()))?;

        let mut out = Collected::default();
        for (index, raw) in response.entries.unwrap_or_default().into_iter().enumerate() {
            match serde_json::from_value::<Entry>(raw) {
                Ok(entry) => out.push(to_record(entry)),
                Err(e) => out.warn(format!("entry {index}: {e}")),
            }
        }

        info!(records = out.records.len(), dropped = out.dropped, "publicapis collected");
        Ok(out)
    }
}

fn to_record(entry: Entry) -> CatalogRecord {
    let category = text(entry.category.as_deref());
    let source = if category.is_empty() {
        SOURCE_PREFIX.to_string()
    } else {
        format!("{SOURCE_PREFIX}/{category}")
    };

    let mut record = CatalogRecord {
        name: text(entry.api.as_deref()),
        description: text(entry.description.as_deref()),
        url: text(entry.link.as_deref()),
        source,
        category,
        // "" upstream means no auth; stays empty, statistics show it as "None".
        auth_method: text(entry.auth.as_deref()),
        region: "Global".into(),
        ..CatalogRecord::default()
    };
    if let Some(https) = entry.https {
        record.metadata.insert("https".into(), https.into());
    }
    if let Some(cors) = entry.cors.filter(|c| !c.is_empty()) {
        record.metadata.insert("cors".into(), cors.into());
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ENTRIES: &str = r#"{
        "count": 4,
        "entries": [
            {"API": "Cat Facts", "Description": "Daily cat facts", "Auth": "", "HTTPS": true,
             "Cors": "no", "Link": "https://alexwohlbruck.github.io/cat-facts/", "Category": "Animals"},
            {"API": "Open Exchange", "Description": "Currency rates", "Auth": "apiKey", "HTTPS": true,
             "Cors": "unknown", "Link": "https://openexchangerates.org", "Category": "Currency Exchange"},
            {"API": "No Link", "Description": "Missing link", "Auth": "", "HTTPS": false,
             "Cors": "no", "Link": "", "Category": "Other"},
            {"API": 42}
        ]
    }"#;

    async fn adapter_for(body: &str) -> (MockServer, PublicApisAdapter) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/entries"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(&server)
            .await;
        let adapter = PublicApisAdapter::new(&CollectConfig::immediate())
            .unwrap()
            .with_base_url(server.uri());
        (server, adapter)
    }

    #[tokio::test]
    async fn maps_entries_to_records() {
        let (_server, adapter) = adapter_for(ENTRIES).await;
        let out = adapter.collect().await.expect("collect");

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.dropped, 1);
        assert_eq!(out.warnings.len(), 1);

        let cats = &out.records[0];
        assert_eq!(cats.name, "Cat Facts");
        assert_eq!(cats.source, "publicapis.org/Animals");
        assert_eq!(cats.auth_method, "");
        assert_eq!(cats.metadata["https"], true.into());
        assert_eq!(cats.metadata["cors"], "no".into());

        assert_eq!(out.records[1].auth_method, "apiKey");
    }

    #[tokio::test]
    async fn null_entries_yield_empty_result() {
        let (_server, adapter) = adapter_for(r#"{"count": 0, "entries": null}"#).await;
        let out = adapter.collect().await.expect("collect");
        assert!(out.records.is_empty());
        assert_eq!(out.dropped, 0);
    }

    #[tokio::test]
    async fn server_down_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let adapter = PublicApisAdapter::new(&CollectConfig::immediate())
            .unwrap()
            .with_base_url(server.uri());
        assert!(matches!(
            adapter.collect().await,
            Err(CatalogError::SourceUnavailable { .. })
        ));
    }
}
