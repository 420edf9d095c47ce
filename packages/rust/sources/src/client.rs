//! Paced, retrying HTTP client shared by the network adapters.
//!
//! Every adapter talks to exactly one provider. The client enforces the
//! provider-friendly pacing between paginated requests and retries
//! transient failures (transport errors, HTTP 429, HTTP 5xx) with
//! exponential backoff. Anything else fails the request immediately.

use std::time::Duration;

use apicatalog_shared::{CatalogError, CollectConfig, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

/// User-Agent string for catalog requests.
const USER_AGENT: &str = concat!("apicatalog/", env!("CARGO_PKG_VERSION"));

/// Longest single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// HTTP client with pacing and retry policy from [`CollectConfig`].
#[derive(Debug, Clone)]
pub struct SourceClient {
    client: Client,
    request_delay: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    bearer: Option<String>,
}

impl SourceClient {
    /// Build a client from the runtime collection config.
    pub fn new(config: &CollectConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| CatalogError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            request_delay: config.request_delay,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            bearer: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }

    /// Sleep for the configured inter-request delay.
    pub async fn pace(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    /// GET `url` and decode the JSON body, retrying transient failures.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| CatalogError::parse(format!("{url}: {e}")))
    }

    /// GET `url` and return the body text, retrying transient failures.
    pub async fn get_text(&self, url: &Url) -> Result<String> {
        self.get_text_if_found(url)
            .await?
            .ok_or_else(|| CatalogError::Network(format!("{url}: HTTP {}", StatusCode::NOT_FOUND)))
    }

    /// Like [`get_json`](Self::get_json), but a 404 is `Ok(None)`.
    pub async fn get_json_if_found<T: DeserializeOwned>(&self, url: &Url) -> Result<Option<T>> {
        match self.get_text_if_found(url).await? {
            Some(body) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| CatalogError::parse(format!("{url}: {e}"))),
            None => Ok(None),
        }
    }

    async fn get_text_if_found(&self, url: &Url) -> Result<Option<String>> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_get(url).await {
                Ok(body) => return Ok(body),
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Transient(e)) if attempt >= self.max_retries => return Err(e),
                Err(Attempt::Transient(e)) => {
                    let backoff = self.backoff(attempt);
                    warn!(%url, attempt, backoff_ms = backoff.as_millis(), error = %e, "transient failure, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_get(&self, url: &Url) -> std::result::Result<Option<String>, Attempt> {
        debug!(%url, "fetching");

        let mut request = self.client.get(url.as_str());
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Attempt::Transient(CatalogError::Network(format!("{url}: {e}"))))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let err = CatalogError::Network(format!("{url}: HTTP {status}"));
            return Err(if is_transient(status) {
                Attempt::Transient(err)
            } else {
                Attempt::Fatal(err)
            });
        }

        response.text().await.map(Some).map_err(|e| {
            Attempt::Transient(CatalogError::Network(format!("{url}: body read failed: {e}")))
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF)
    }
}

/// How a single attempt failed.
enum Attempt {
    Transient(CatalogError),
    Fatal(CatalogError),
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
