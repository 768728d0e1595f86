//! Live match feed over HTTP.
//!
//! GETs the configured endpoint and parses the tournament JSON. Transient
//! failures (network errors, HTTP 429 and 5xx) are retried with exponential
//! backoff up to `max_retries`; anything else fails the fetch immediately.
//! The raw body can be mirrored to a snapshot file for offline replays.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{parse_matches, FeedOptions, MatchFeed};
use crate::types::{Match, PoolError};

/// Base delay for exponential backoff.
const BASE_BACKOFF: Duration = Duration::from_millis(1000);

pub struct HttpFeed {
    http: Client,
    url: String,
    api_key: Option<String>,
    max_retries: u32,
    backoff: Duration,
    snapshot_path: Option<PathBuf>,
    opts: FeedOptions,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, max_retries: u32, timeout: Duration, opts: FeedOptions) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("CUP-POOL/0.1.0")
            .build()
            .context("Failed to build feed HTTP client")?;
        Ok(Self {
            http,
            url: url.into(),
            api_key: None,
            max_retries,
            backoff: BASE_BACKOFF,
            snapshot_path: None,
            opts,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Mirror every successfully fetched body to this file.
    pub fn with_snapshot(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot_path = path;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before retry number `attempt` (1-based), doubling each time.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// GET the feed body with retry + backoff.
    async fn fetch_body(&self) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying feed request");
                tokio::time::sleep(delay).await;
            }

            let mut req = self.http.get(&self.url);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.text().await.context("Failed to read feed body");
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(status = %status, attempt, "Retryable feed error");
                        last_error = Some(format!("HTTP {status}"));
                        continue;
                    }

                    return Err(PoolError::Feed(format!("{} returned {status}", self.url)).into());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Feed request failed");
                    last_error = Some(format!("Request error: {e}"));
                }
            }
        }

        Err(PoolError::Feed(format!(
            "{} failed after {} retries: {}",
            self.url,
            self.max_retries,
            last_error.unwrap_or_default()
        ))
        .into())
    }
}

#[async_trait]
impl MatchFeed for HttpFeed {
    async fn fetch_matches(&self) -> Result<Vec<Match>> {
        let body = self.fetch_body().await?;
        let matches = parse_matches(&body, &self.opts)?;

        if let Some(path) = &self.snapshot_path {
            if let Err(e) = tokio::fs::write(path, &body).await {
                warn!(path = %path.display(), error = %e, "Failed to write feed snapshot");
            }
        }

        info!(url = %self.url, count = matches.len(), "Feed fetched");
        Ok(matches)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
