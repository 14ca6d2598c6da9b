// src/ingest/fetcher.rs
//! Network retrieval shared by every source adapter.
//!
//! - one `reqwest::Client` (connection pool, user agent, redirect limit)
//! - per-request timeout, must be strictly positive
//! - transient failures (timeouts, connection errors, 5xx) retried with
//!   capped exponential backoff; 4xx returned immediately
//!
//! No caching: every call hits the network.

use chrono::Utc;
use metrics::counter;
use reqwest::{redirect, Client};
use std::time::Duration;
use url::Url;

use crate::ingest::config::FetchConfig;
use crate::ingest::error::FetchError;
use crate::ingest::types::RawDocument;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retry_budget: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(cfg: &FetchConfig) -> Self {
        Self {
            retry_budget: cfg.retry_budget,
            base: Duration::from_millis(cfg.backoff_base_ms),
            cap: Duration::from_millis(cfg.backoff_cap_ms),
        }
    }
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    retry: RetryPolicy,
    default_timeout: Duration,
}

impl Fetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&cfg.user_agent)
            .redirect(redirect::Policy::limited(cfg.max_redirects))
            .build()
            .map_err(|e| FetchError::NetworkError(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            retry: RetryPolicy::from(cfg),
            default_timeout: cfg.timeout(),
        })
    }

    /// Timeout from configuration; adapters use it for every request.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub async fn fetch_default(&self, url: &Url) -> Result<RawDocument, FetchError> {
        self.fetch(url, self.default_timeout).await
    }

    pub async fn fetch(&self, url: &Url, timeout: Duration) -> Result<RawDocument, FetchError> {
        if timeout.is_zero() {
            return Err(FetchError::InvalidTimeout);
        }

        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(url, timeout).await {
                Ok(doc) => return Ok(doc),
                Err(e) if e.is_transient() && attempt < self.retry.retry_budget => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    tracing::debug!(
                        %url,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient fetch failure, retrying"
                    );
                    counter!("ingest_fetch_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url, timeout: Duration) -> Result<RawDocument, FetchError> {
        let resp = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let final_url = resp.url().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        Ok(RawDocument {
            url: final_url,
            body: body.to_vec(),
            fetched_at: Utc::now(),
        })
    }
}
