//! HTTP fetch capability for cached sources
//!
//! Defines the `Fetcher` trait that the cache layer consumes, the error
//! taxonomy for fetch attempts, and the production `HttpFetcher` built on
//! reqwest. The cache never talks to the network directly; it only sees
//! this seam, which keeps the refresh state machine testable with
//! scripted fetchers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// Default per-request timeout so one slow source cannot stall a whole
/// refresh pass.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while fetching and decoding a source
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure: DNS, connect, timeout
    #[error("transport error: {0}")]
    Transport(String),

    /// Certificate validation failed; retryable only for sources that
    /// explicitly allow insecure fallback
    #[error("TLS validation error: {0}")]
    TlsValidation(String),

    /// The server responded with a non-success status
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// The body did not match the declared decode mode
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

/// Result of one HTTP fetch: the status code plus the body as text.
/// Decoding into structured form happens in the cache layer, per item.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: String,
}

impl FetchResponse {
    /// Whether the status code is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The injected transport capability.
///
/// `verify_tls = false` requests a fetch with certificate validation
/// disabled; implementations that cannot do that should return the same
/// error as the verified attempt.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, verify_tls: bool) -> Result<FetchResponse, FetchError>;
}

/// Production fetcher backed by reqwest with rustls.
///
/// Holds two clients: one that validates certificates and one that does
/// not, so the insecure retry path does not rebuild a client per call.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    insecure_client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the default per-request timeout
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Creates a fetcher with a custom per-request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let insecure_client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            insecure_client,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, verify_tls: bool) -> Result<FetchResponse, FetchError> {
        let client = if verify_tls {
            &self.client
        } else {
            &self.insecure_client
        };

        let response = client.get(url).send().await.map_err(classify_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_error)?;

        Ok(FetchResponse { status, body })
    }
}

/// Maps a reqwest error into the fetch taxonomy, distinguishing
/// certificate-validation failures so the caller can decide on an
/// insecure retry.
fn classify_error(err: reqwest::Error) -> FetchError {
    if is_certificate_error(&err) {
        FetchError::TlsValidation(err.to_string())
    } else {
        FetchError::Transport(err.to_string())
    }
}

/// Walks the error source chain looking for certificate-related causes.
/// reqwest does not expose a dedicated TLS error kind, so this matches on
/// the messages rustls and the TLS plumbing actually produce.
fn is_certificate_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let msg = err.to_string().to_lowercase();
    if msg.contains("certificate")
        || msg.contains("unknownissuer")
        || msg.contains("self-signed")
        || msg.contains("invalid peer")
    {
        return true;
    }
    err.source().map(is_certificate_error).unwrap_or(false)
}
