//! Upstream client: one bounded-window fetch per call, with a classified outcome.
//!
//! Status mapping for the historical observations API:
//! - 409 (conflicting request in progress) and 429 (rate limited) are retryable
//! - 400 means the window precedes the earliest data the station has
//! - anything else that is not a success is fatal

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use storage::CacheStore;
use weather_common::{decode_observations, ObservationRow, Station, Window};

/// Default upstream endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.weather.com";

/// Causes of a fatal fetch, kept for end-of-run reporting.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Worker aborted: {0}")]
    Aborted(String),
}

/// Result of one fetch attempt.
#[derive(Debug)]
pub enum FetchOutcome {
    Succeeded(Vec<ObservationRow>),
    /// Transient upstream conflict; the same window may be retried later.
    Retryable(String),
    /// The window precedes the earliest available data.
    NoMoreData,
    Fatal(FetchError),
}

impl FetchOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchOutcome::Succeeded(_) => "succeeded",
            FetchOutcome::Retryable(_) => "retryable",
            FetchOutcome::NoMoreData => "no_more_data",
            FetchOutcome::Fatal(_) => "fatal",
        }
    }
}

/// A source of observations for one station window.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch(&self, station: &Station, window: &Window) -> FetchOutcome;
}

/// Classify a non-success upstream response.
pub fn classify_failure(status: StatusCode, body: &str) -> FetchOutcome {
    match status {
        StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS => {
            FetchOutcome::Retryable(format!("HTTP {}", status.as_u16()))
        }
        StatusCode::BAD_REQUEST => FetchOutcome::NoMoreData,
        status => FetchOutcome::Fatal(FetchError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        }),
    }
}

/// Connection settings for the historical observations API.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub api_key: String,
    /// HTTP request timeout
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Client for `/v1/location/{station}/observations/historical.json`.
///
/// Consults the cache before every network call and writes successfully
/// decoded bodies back to it.
pub struct WeatherComSource {
    client: Client,
    config: SourceConfig,
    cache: Arc<CacheStore>,
    network_requests: AtomicU64,
}

impl WeatherComSource {
    pub fn new(config: SourceConfig, cache: Arc<CacheStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            cache,
            network_requests: AtomicU64::new(0),
        })
    }

    pub fn url_for(&self, station: &Station, window: &Window) -> String {
        format!(
            "{}/v1/location/{}/observations/historical.json?apiKey={}&units=e&startDate={}&endDate={}",
            self.config.base_url.trim_end_matches('/'),
            station.code(),
            self.config.api_key,
            window.start_compact(),
            window.end_compact(),
        )
    }

    /// Requests sent to upstream so far; cache hits are not counted.
    pub fn network_requests(&self) -> u64 {
        self.network_requests.load(Ordering::Relaxed)
    }

    async fn fetch_remote(&self, station: &Station, window: &Window) -> FetchOutcome {
        self.network_requests.fetch_add(1, Ordering::Relaxed);

        let response = match self.client.get(self.url_for(station, window)).send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Fatal(FetchError::Transport(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Upstream returned an error status");
            return classify_failure(status, &body);
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::Fatal(FetchError::Transport(e.to_string())),
        };

        let rows = match decode_observations(&body) {
            Ok(rows) => rows,
            Err(e) => return FetchOutcome::Fatal(FetchError::Decode(e.to_string())),
        };

        // Only bodies that decoded are cached
        if let Err(e) = self.cache.put(station, window, &body).await {
            warn!(error = %e, "Failed to cache response");
        }

        FetchOutcome::Succeeded(rows)
    }
}

#[async_trait]
impl ObservationSource for WeatherComSource {
    #[instrument(skip_all, fields(station = %station, window = %window))]
    async fn fetch(&self, station: &Station, window: &Window) -> FetchOutcome {
        match self.cache.get(station, window).await {
            Ok(Some(body)) => {
                return match decode_observations(&body) {
                    Ok(rows) => FetchOutcome::Succeeded(rows),
                    Err(e) => FetchOutcome::Fatal(FetchError::Decode(format!(
                        "cached entry {}: {}",
                        self.cache.path_for(station, window).display(),
                        e
                    ))),
                };
            }
            Ok(None) => {}
            Err(e) => return FetchOutcome::Fatal(FetchError::Cache(e.to_string())),
        }

        self.fetch_remote(station, window).await
    }
}
