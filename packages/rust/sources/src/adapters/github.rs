//! GitHub search adapter (layer 3).
//!
//! Two passes. The repository pass runs API-related repository searches,
//! keeps repositories that look like APIs and checks each for well-known
//! spec file paths; a repository with spec files yields one record per file.
//! The code pass searches for spec files by name and reads each hit to guess
//! its category and auth scheme. Every request is paced; a failed search page
//! ends that query but not the layer.

use std::sync::LazyLock;

use apicatalog_shared::{CatalogError, CatalogRecord, CollectConfig, Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use super::{Collected, SourceAdapter, text};
use crate::client::SourceClient;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const PER_PAGE: u32 = 100;
const DEFAULT_MAX_PAGES: u32 = 3;
const CODE_PER_PAGE: u32 = 50;
/// Spec content kept for keyword sniffing, in chars.
const SPEC_SNIFF_CHARS: usize = 2000;

const DEFAULT_QUERIES: &[&str] = &[
    "openapi.yaml OR openapi.yml OR swagger.yaml OR swagger.yml",
    "api documentation openapi",
    "rest api swagger",
    "graphql api schema",
    "api endpoints documentation",
];

const DEFAULT_FILE_QUERIES: &[&str] = &[
    "filename:openapi.yaml",
    "filename:swagger.yaml",
    "filename:api.yaml",
    "filename:openapi.json",
    "filename:swagger.json",
];

/// Paths checked in every API-like repository.
const DEFAULT_SPEC_PATHS: &[&str] = &[
    "openapi.yaml",
    "openapi.yml",
    "openapi.json",
    "swagger.yaml",
    "swagger.yml",
    "swagger.json",
    "api.yaml",
    "api.yml",
    "api.json",
    "docs/openapi.yaml",
    "docs/swagger.yaml",
    "spec/openapi.yaml",
    "spec/swagger.yaml",
];

const API_INDICATORS: &[&str] = &[
    "api",
    "rest",
    "graphql",
    "swagger",
    "openapi",
    "microservice",
    "service",
    "endpoint",
    "sdk",
];

/// Category keyword table, checked in order; first match wins.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Web Development", &["web", "frontend", "backend", "fullstack", "react", "vue", "angular"]),
    ("Mobile", &["mobile", "android", "ios", "react-native", "flutter"]),
    ("AI/ML", &["ai", "ml", "machine-learning", "artificial-intelligence", "tensorflow", "pytorch"]),
    ("Database", &["database", "db", "sql", "nosql", "mongodb", "postgresql"]),
    ("Cloud", &["cloud", "aws", "azure", "gcp", "docker", "kubernetes"]),
    ("Finance", &["finance", "fintech", "payment", "trading", "blockchain", "crypto"]),
    ("Social", &["social", "chat", "messaging", "communication"]),
    ("E-commerce", &["ecommerce", "shop", "store", "cart"]),
    ("Developer Tools", &["devtools", "cli", "automation", "ci", "cd", "testing"]),
    ("IoT", &["iot", "sensor", "hardware", "embedded", "arduino", "raspberry"]),
];

/// Category keywords for spec file content; first match wins.
const SPEC_CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Finance", &["payment", "bank", "currency", "trading", "financial"]),
    ("Social", &["user", "social", "friend", "message", "chat"]),
    ("E-commerce", &["product", "order", "cart", "shop"]),
    ("Content", &["content", "media", "blog", "cms", "article"]),
    ("Analytics", &["analytics", "metrics", "tracking", "event"]),
    ("Communication", &["email", "sms", "notification"]),
    ("Storage", &["file", "storage", "upload", "download", "blob"]),
];

/// Auth markers in spec content, checked in order.
const SPEC_AUTH_MARKERS: &[(&str, &[&str])] = &[
    ("OAuth", &["oauth"]),
    ("Bearer Token", &["bearer"]),
    ("API Key", &["apikey", "api-key", "api_key"]),
    ("Basic Auth", &["basic"]),
    ("JWT", &["jwt"]),
];

/// Whole-word matchers compiled from [`CATEGORY_KEYWORDS`].
static CATEGORY_RULES: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| compile_rules(CATEGORY_KEYWORDS, r"\b"));

/// Word-prefix matchers, so "payments" and "orders" count.
static SPEC_CATEGORY_RULES: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| compile_rules(SPEC_CATEGORY_KEYWORDS, ""));

fn compile_rules(
    table: &'static [(&'static str, &'static [&'static str])],
    word_end: &str,
) -> Vec<(&'static str, Regex)> {
    table
        .iter()
        .filter_map(|(category, keywords)| {
            let alternation = keywords
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"\b(?:{alternation}){word_end}"))
                .ok()
                .map(|re| (*category, re))
        })
        .collect()
}

/// Adapter over the GitHub repository and code search APIs.
pub struct GitHubAdapter {
    client: SourceClient,
    base_url: String,
    queries: Vec<String>,
    file_queries: Vec<String>,
    spec_paths: Vec<String>,
    max_pages: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repository>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    #[serde(default)]
    name: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    stargazers_count: i64,
    #[serde(default)]
    forks_count: i64,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    license: Option<License>,
}

#[derive(Debug, Deserialize)]
struct CodeSearchResponse {
    #[serde(default)]
    items: Vec<CodeHit>,
}

#[derive(Debug, Deserialize)]
struct CodeHit {
    #[serde(default)]
    path: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    repository: CodeRepository,
}

#[derive(Debug, Default, Deserialize)]
struct CodeRepository {
    #[serde(default)]
    name: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    stargazers_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ContentFile {
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: String,
}

impl ContentFile {
    /// Decoded text, truncated for keyword sniffing. Empty when not base64.
    fn sniff_text(&self) -> String {
        if self.encoding.as_deref() != Some("base64") {
            return String::new();
        }
        let packed: String = self.content.split_whitespace().collect();
        match STANDARD.decode(packed) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).chars().take(SPEC_SNIFF_CHARS).collect(),
            Err(e) => {
                debug!(error = %e, "undecodable spec content");
                String::new()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct License {
    #[serde(default)]
    name: Option<String>,
}

impl GitHubAdapter {
    /// Create the adapter; sends the configured token, if any, as a bearer.
    pub fn new(config: &CollectConfig) -> Result<Self> {
        Ok(Self {
            client: SourceClient::new(config)?.with_bearer(config.github_token.clone()),
            base_url: DEFAULT_BASE_URL.into(),
            queries: DEFAULT_QUERIES.iter().map(|q| (*q).to_string()).collect(),
            file_queries: DEFAULT_FILE_QUERIES.iter().map(|q| (*q).to_string()).collect(),
            spec_paths: DEFAULT_SPEC_PATHS.iter().map(|p| (*p).to_string()).collect(),
            max_pages: DEFAULT_MAX_PAGES,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_queries<I, S>(mut self, queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queries = queries.into_iter().map(Into::into).collect();
        self
    }

    /// Code-search queries; empty disables the code pass.
    pub fn with_file_queries<I, S>(mut self, queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_queries = queries.into_iter().map(Into::into).collect();
        self
    }

    /// Paths checked in each API-like repository; empty disables the check.
    pub fn with_spec_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn search_url(&self, query: &str, page: u32) -> Result<Url> {
        let base = format!("{}/search/repositories", self.base());
        let per_page = PER_PAGE.to_string();
        let page = page.to_string();
        Url::parse_with_params(
            &base,
            [
                ("q", query),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
                ("page", page.as_str()),
            ],
        )
        .map_err(|e| CatalogError::config(format!("invalid github base url: {e}")))
    }

    fn code_search_url(&self, query: &str) -> Result<Url> {
        let base = format!("{}/search/code", self.base());
        let per_page = CODE_PER_PAGE.to_string();
        Url::parse_with_params(
            &base,
            [("q", query), ("sort", "indexed"), ("per_page", per_page.as_str())],
        )
        .map_err(|e| CatalogError::config(format!("invalid github base url: {e}")))
    }

    fn contents_url(&self, full_name: &str, file_path: &str) -> Result<Url> {
        Url::parse(&format!("{}/repos/{full_name}/contents/{file_path}", self.base()))
            .map_err(|e| CatalogError::config(format!("invalid github base url: {e}")))
    }

    /// Fetch one file from the contents API; `None` when it does not exist.
    async fn fetch_contents(&self, full_name: &str, file_path: &str) -> Result<Option<ContentFile>> {
        self.client.pace().await;
        let url = self.contents_url(full_name, file_path)?;
        self.client.get_json_if_found(&url).await
    }

    /// Spec paths present in `repo`. Lookup errors other than "not found"
    /// become warnings and count as absent.
    async fn find_spec_files(&self, repo: &Repository, out: &mut Collected) -> Result<Vec<String>> {
        let mut found = Vec::new();
        if repo.full_name.is_empty() {
            return Ok(found);
        }
        for spec_path in &self.spec_paths {
            match self.fetch_contents(&repo.full_name, spec_path).await {
                Ok(Some(_)) => found.push(spec_path.clone()),
                Ok(None) => {}
                Err(e @ CatalogError::Config { .. }) => return Err(e),
                Err(e) => out.warn(format!("{}/{spec_path}: {e}", repo.full_name)),
            }
        }
        Ok(found)
    }

    async fn spec_hit_record(&self, hit: CodeHit, out: &mut Collected) -> Result<CatalogRecord> {
        let content = match self.fetch_contents(&hit.repository.full_name, &hit.path).await {
            Ok(file) => file.map(|f| f.sniff_text()).unwrap_or_default(),
            Err(e @ CatalogError::Config { .. }) => return Err(e),
            Err(e) => {
                out.warn(format!("{}/{}: {e}", hit.repository.full_name, hit.path));
                String::new()
            }
        };
        Ok(code_hit_to_record(hit, &content))
    }
}

#[async_trait]
impl SourceAdapter for GitHubAdapter {
    fn name(&self) -> &str {
        "GitHub Repositories"
    }

    fn target_count(&self) -> usize {
        1500
    }

    #[instrument(skip_all, fields(source = "github"))]
    async fn collect(&self) -> Result<Collected> {
        let mut out = Collected::default();
        let mut requests = 0usize;
        let mut failures = 0usize;
        let mut last_error = None;

        for query in &self.queries {
            for page in 1..=self.max_pages {
                if requests > 0 {
                    self.client.pace().await;
                }
                requests += 1;

                let url = self.search_url(query, page)?;
                let response: SearchResponse = match self.client.get_json(&url).await {
                    Ok(response) => response,
                    Err(e) => {
                        failures += 1;
                        out.warn(format!("query '{query}' page {page}: {e}"));
                        last_error = Some(e);
                        break;
                    }
                };

                let fetched = response.items.len();
                debug!(%query, page, fetched, "search page");
                for repo in response.items {
                    if !is_likely_api_repo(&repo) {
                        continue;
                    }
                    let spec_files = self.find_spec_files(&repo, &mut out).await?;
                    if spec_files.is_empty() {
                        out.push(to_record(&repo, None));
                    } else {
                        for spec_file in &spec_files {
                            out.push(to_record(&repo, Some(spec_file.as_str())));
                        }
                    }
                }
                if fetched < PER_PAGE as usize {
                    break;
                }
            }
        }

        for query in &self.file_queries {
            if requests > 0 {
                self.client.pace().await;
            }
            requests += 1;

            let url = self.code_search_url(query)?;
            let response: CodeSearchResponse = match self.client.get_json(&url).await {
                Ok(response) => response,
                Err(e) => {
                    failures += 1;
                    out.warn(format!("code query '{query}': {e}"));
                    last_error = Some(e);
                    continue;
                }
            };
            debug!(%query, hits = response.items.len(), "code search");
            for hit in response.items {
                let record = self.spec_hit_record(hit, &mut out).await?;
                out.push(record);
            }
        }

        if requests > 0 && failures == requests {
            let message = last_error.map_or_else(|| "no search succeeded".to_string(), |e| e.to_string());
            return Err(CatalogError::source_unavailable("github", message));
        }

        info!(
            records = out.records.len(),
            dropped = out.dropped,
            failed_pages = failures,
            "github collected"
        );
        Ok(out)
    }
}

fn is_likely_api_repo(repo: &Repository) -> bool {
    let name = repo.name.to_lowercase();
    let description = repo.description.as_deref().unwrap_or_default().to_lowercase();
    API_INDICATORS.iter().any(|indicator| {
        name.contains(indicator)
            || description.contains(indicator)
            || repo.topics.iter().any(|t| t.to_lowercase().contains(indicator))
    })
}

fn category_for(repo: &Repository) -> &'static str {
    let haystack = format!(
        "{} {} {} {}",
        repo.name,
        repo.description.as_deref().unwrap_or_default(),
        repo.language.as_deref().unwrap_or_default(),
        repo.topics.join(" ")
    )
    .to_lowercase();

    CATEGORY_RULES
        .iter()
        .find(|(_, re)| re.is_match(&haystack))
        .map_or("Other", |(category, _)| *category)
}

/// Record for an API-like repository, or for one spec file inside it.
fn to_record(repo: &Repository, spec_file: Option<&str>) -> CatalogRecord {
    let html_url = repo.html_url.trim();
    let url = match spec_file {
        Some(file) => {
            let branch = repo.default_branch.as_deref().unwrap_or("main");
            format!("{html_url}/blob/{branch}/{file}")
        }
        None => html_url.to_string(),
    };
    let mut record = CatalogRecord {
        name: format!("{} API", repo.name.trim()),
        description: text(repo.description.as_deref()),
        url,
        source: format!("github/{}", repo.full_name),
        category: category_for(repo).to_string(),
        region: "Global".into(),
        ..CatalogRecord::default()
    };
    if repo.name.trim().is_empty() {
        record.name.clear();
    }
    if html_url.is_empty() {
        record.url.clear();
    }

    let metadata = &mut record.metadata;
    metadata.insert("github_repo".into(), repo.full_name.as_str().into());
    metadata.insert("github_url".into(), html_url.into());
    metadata.insert("stars".into(), repo.stargazers_count.into());
    metadata.insert("forks".into(), repo.forks_count.into());
    if let Some(file) = spec_file {
        metadata.insert("api_file".into(), file.into());
    }
    if let Some(language) = repo.language.as_deref().filter(|l| !l.is_empty()) {
        metadata.insert("language".into(), language.into());
    }
    if !repo.topics.is_empty() {
        metadata.insert("topics".into(), repo.topics.join(",").into());
    }
    if let Some(updated) = repo.updated_at.as_deref() {
        metadata.insert("updated_at".into(), updated.into());
    }
    if let Some(license) = repo.license.as_ref().and_then(|l| l.name.as_deref()) {
        metadata.insert("license".into(), license.into());
    }
    record
}

/// Record for a spec file found by code search. `content` is the sniffed
/// file text, empty when it could not be read.
fn code_hit_to_record(hit: CodeHit, content: &str) -> CatalogRecord {
    let repo = hit.repository;
    let mut record = CatalogRecord {
        name: format!("{} API Spec", repo.name.trim()),
        description: text(repo.description.as_deref()),
        url: hit.html_url.trim().to_string(),
        source: format!("github/{}/spec", repo.full_name),
        category: category_from_spec(content).to_string(),
        auth_method: auth_from_spec(content).to_string(),
        region: "Global".into(),
        ..CatalogRecord::default()
    };
    if repo.name.trim().is_empty() {
        record.name.clear();
    }

    let metadata = &mut record.metadata;
    metadata.insert("github_repo".into(), repo.full_name.into());
    metadata.insert("file_path".into(), hit.path.as_str().into());
    metadata.insert("file_type".into(), file_type(&hit.path).into());
    metadata.insert("spec_format".into(), spec_format(&hit.path).into());
    metadata.insert("stars".into(), repo.stargazers_count.unwrap_or_default().into());
    if let Some(language) = repo.language.filter(|l| !l.is_empty()) {
        metadata.insert("repo_language".into(), language.into());
    }
    record
}

/// Auth scheme named in spec text; empty when none is recognized.
fn auth_from_spec(content: &str) -> &'static str {
    let content = content.to_lowercase();
    SPEC_AUTH_MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| content.contains(m)))
        .map_or("", |(auth, _)| *auth)
}

fn category_from_spec(content: &str) -> &'static str {
    let content = content.to_lowercase();
    SPEC_CATEGORY_RULES
        .iter()
        .find(|(_, re)| re.is_match(&content))
        .map_or("API", |(category, _)| *category)
}

fn file_type(path: &str) -> &'static str {
    let path = path.to_lowercase();
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        "YAML"
    } else if path.ends_with(".json") {
        "JSON"
    } else {
        "Unknown"
    }
}

fn spec_format(path: &str) -> &'static str {
    if path.to_lowercase().contains("openapi") {
        "OpenAPI"
    } else {
        "Swagger"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo(name: &str, description: &str, topics: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "full_name": format!("octo/{name}"),
            "html_url": format!("https://github.com/octo/{name}"),
            "description": description,
            "language": "Rust",
            "stargazers_count": 120,
            "forks_count": 7,
            "topics": topics,
        })
    }

    /// Repository pass only, with no spec path lookups.
    fn adapter(server: &MockServer) -> GitHubAdapter {
        GitHubAdapter::new(&CollectConfig::immediate())
            .unwrap()
            .with_base_url(server.uri())
            .with_queries(["rest api"])
            .with_file_queries(Vec::<String>::new())
            .with_spec_paths(Vec::<String>::new())
    }

    fn encoded(text: &str) -> serde_json::Value {
        // The contents API wraps base64 at 60 columns.
        let raw = STANDARD.encode(text);
        let wrapped = raw
            .as_bytes()
            .chunks(60)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        serde_json::json!({ "encoding": "base64", "content": wrapped })
    }

    #[test]
    fn category_keywords_match_whole_words() {
        let mut r = Repository {
            name: "payments-gateway".into(),
            full_name: "octo/payments-gateway".into(),
            html_url: String::new(),
            description: Some("Accept payment from cards".into()),
            language: None,
            stargazers_count: 0,
            forks_count: 0,
            topics: vec![],
            updated_at: None,
            default_branch: None,
            license: None,
        };
        assert_eq!(category_for(&r), "Finance");

        // "email" must not match the "ai" keyword.
        r.name = "email-sender".into();
        r.description = Some("Send email".into());
        assert_eq!(category_for(&r), "Other");
    }

    #[tokio::test]
    async fn collects_api_like_repositories() {
        let server = MockServer::start().await;
        let items = vec![
            repo("weather-api", "Forecast REST service", &["weather"]),
            repo("dotfiles", "My config", &[]),
            repo("shopfront", "Storefront", &["graphql", "shop"]),
        ];
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("q", "rest api"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": items })))
            .mount(&server)
            .await;

        let out = adapter(&server).collect().await.expect("collect");
        assert_eq!(out.records.len(), 2);

        let weather = &out.records[0];
        assert_eq!(weather.name, "weather-api API");
        assert_eq!(weather.source, "github/octo/weather-api");
        assert_eq!(weather.auth_method, "");
        assert_eq!(weather.metadata["stars"], 120i64.into());
        assert_eq!(weather.metadata["topics"], "weather".into());

        assert_eq!(out.records[1].category, "E-commerce");
    }

    #[tokio::test]
    async fn rate_limited_search_fails_the_layer_when_nothing_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = adapter(&server).collect().await.unwrap_err();
        assert!(matches!(err, CatalogError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn failed_query_degrades_to_warning() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "good"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "items": [repo("geo-api", "", &[])] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "bad"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let out = GitHubAdapter::new(&CollectConfig::immediate())
            .unwrap()
            .with_base_url(server.uri())
            .with_queries(["bad", "good"])
            .collect()
            .await
            .expect("partial failure is not an error");
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn spec_content_yields_auth_and_category() {
        assert_eq!(auth_from_spec("securitySchemes:\n  oauth2:\n    type: oauth2"), "OAuth");
        assert_eq!(auth_from_spec("scheme: Bearer"), "Bearer Token");
        assert_eq!(auth_from_spec("in: header\nname: X-API-Key"), "API Key");
        assert_eq!(auth_from_spec("paths: {}"), "");
        assert_eq!(auth_from_spec(""), "");

        assert_eq!(category_from_spec("/payments/{id}:"), "Finance");
        assert_eq!(category_from_spec("/orders:\n  get:"), "E-commerce");
        assert_eq!(category_from_spec("/health:"), "API");

        assert_eq!(file_type("docs/openapi.YML"), "YAML");
        assert_eq!(file_type("swagger.json"), "JSON");
        assert_eq!(spec_format("spec/openapi.yaml"), "OpenAPI");
        assert_eq!(spec_format("swagger.json"), "Swagger");
    }

    #[tokio::test]
    async fn repositories_with_spec_files_yield_one_record_per_file() {
        let server = MockServer::start().await;
        let mut weather = repo("weather-api", "Forecast REST service", &[]);
        weather["default_branch"] = "trunk".into();
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "items": [weather, repo("geo-api", "", &[])] })),
            )
            .mount(&server)
            .await;
        for file in ["openapi.yaml", "docs/swagger.yaml"] {
            Mock::given(method("GET"))
                .and(path(format!("/repos/octo/weather-api/contents/{file}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(encoded("openapi: 3.0.0")))
                .mount(&server)
                .await;
        }

        let out = adapter(&server)
            .with_spec_paths(["openapi.yaml", "swagger.json", "docs/swagger.yaml"])
            .collect()
            .await
            .expect("collect");

        let urls: Vec<&str> = out.records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://github.com/octo/weather-api/blob/trunk/openapi.yaml",
                "https://github.com/octo/weather-api/blob/trunk/docs/swagger.yaml",
                "https://github.com/octo/geo-api",
            ]
        );
        assert_eq!(out.records[1].metadata["api_file"], "docs/swagger.yaml".into());
        assert!(!out.records[2].metadata.contains_key("api_file"));
        assert!(out.warnings.is_empty());
    }

    #[tokio::test]
    async fn code_search_reads_spec_files() {
        let server = MockServer::start().await;
        let hit = serde_json::json!({
            "name": "openapi.yaml",
            "path": "api/openapi.yaml",
            "html_url": "https://github.com/acme/billing/blob/main/api/openapi.yaml",
            "repository": {
                "name": "billing",
                "full_name": "acme/billing",
                "description": "Billing service",
                "language": "Go",
            },
        });
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .and(query_param("q", "filename:openapi.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [hit] })))
            .expect(1)
            .mount(&server)
            .await;
        let spec = "openapi: 3.0.0\npaths:\n  /payments:\n    post: {}\ncomponents:\n  securitySchemes:\n    token:\n      scheme: bearer\n";
        Mock::given(method("GET"))
            .and(path("/repos/acme/billing/contents/api/openapi.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_json(encoded(spec)))
            .mount(&server)
            .await;

        let out = adapter(&server)
            .with_queries(Vec::<String>::new())
            .with_file_queries(["filename:openapi.yaml"])
            .collect()
            .await
            .expect("collect");

        assert_eq!(out.records.len(), 1);
        let billing = &out.records[0];
        assert_eq!(billing.name, "billing API Spec");
        assert_eq!(billing.source, "github/acme/billing/spec");
        assert_eq!(billing.category, "Finance");
        assert_eq!(billing.auth_method, "Bearer Token");
        assert_eq!(billing.metadata["file_type"], "YAML".into());
        assert_eq!(billing.metadata["spec_format"], "OpenAPI".into());
        assert_eq!(billing.metadata["repo_language"], "Go".into());
    }

    #[tokio::test]
    async fn failed_code_search_is_a_warning_when_repositories_arrive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "items": [repo("geo-api", "", &[])] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let out = adapter(&server)
            .with_file_queries(["filename:swagger.json"])
            .collect()
            .await
            .expect("code search failure alone is not fatal");
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.warnings.len(), 1);
    }

    #[tokio::test]
    async fn page_limit_stops_a_full_result_set() {
        let server = MockServer::start().await;
        let items: Vec<_> = (0..PER_PAGE)
            .map(|i| repo(&format!("svc-{i}-api"), "", &[]))
            .collect();
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": items })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let out = adapter(&server).with_max_pages(1).collect().await.expect("collect");
        assert_eq!(out.records.len(), PER_PAGE as usize);
    }
}
