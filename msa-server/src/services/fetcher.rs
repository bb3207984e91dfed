//! Remote object fetcher
//!
//! Downloads one audio object by URI and classifies the outcome. No retries
//! happen here; callers wrap `fetch` in a [`RetryPolicy`](msa_common::RetryPolicy).

use async_trait::async_trait;
use bytes::Bytes;
use msa_common::Transient;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Fetch errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Request exceeded the per-fetch deadline
    #[error("Fetch timed out")]
    Timeout,

    /// Remote answered with a non-2xx status
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// Remote answered 2xx but the body is too short to be real audio
    #[error("Payload too small: {len} bytes (minimum {min})")]
    TooSmall { len: usize, min: usize },

    /// Connection, DNS, TLS or body read failure
    #[error("Network error: {0}")]
    Network(String),
}

impl Transient for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) => true,
            FetchError::Http { status } => *status >= 500 || *status == 429,
            FetchError::TooSmall { .. } => false,
        }
    }
}

/// Fetcher settings (`[archive.fetch]` section)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Per-fetch deadline
    pub timeout_secs: u64,
    /// Payloads shorter than this are treated as broken uploads
    pub min_payload_bytes: usize,
    pub max_redirects: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            min_payload_bytes: 1000,
            max_redirects: 10,
        }
    }
}

/// Source of audio payloads
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Fetch the complete payload behind `uri`
    async fn fetch(&self, uri: &str) -> Result<Bytes, FetchError>;
}

/// HTTP fetcher over a shared `reqwest` connection pool
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    min_payload_bytes: usize,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            min_payload_bytes: settings.min_payload_bytes,
        })
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = err.status() {
        FetchError::Http {
            status: status.as_u16(),
        }
    } else {
        FetchError::Network(err.to_string())
    }
}

#[async_trait]
impl AudioFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(uri).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let payload = response.bytes().await.map_err(classify)?;
        if payload.len() < self.min_payload_bytes {
            return Err(FetchError::TooSmall {
                len: payload.len(),
                min: self.min_payload_bytes,
            });
        }

        tracing::debug!(uri, bytes = payload.len(), "Fetched audio object");
        Ok(payload)
    }
}
