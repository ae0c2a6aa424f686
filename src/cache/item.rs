//! Per-source cache entry with TTL and staleness tracking
//!
//! A `CachedItem` owns the refresh state machine for one external
//! endpoint: it rate-limits fetches with a TTL measured from the last
//! success, keeps serving the previous value when a refresh fails, and
//! reports each attempt as a three-way `Outcome`.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::fetch::{FetchError, Fetcher};

/// Result of one refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// TTL not expired, or the fetched value equals the stored one
    Unchanged,
    /// A new value was fetched and stored
    Updated,
    /// The attempt failed; the previous value (if any) is still served
    Failed,
}

/// How a fetched body is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Parse the body as JSON
    Structured,
    /// Keep the body as opaque text
    Raw,
}

/// A successfully fetched payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Structured(Value),
    Raw(String),
}

impl Payload {
    /// The JSON value, if this payload was decoded
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Payload::Structured(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    /// The raw text, if this payload was kept opaque
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Payload::Raw(text) => Some(text),
            Payload::Structured(_) => None,
        }
    }
}

/// Immutable configuration for one cached source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemConfig {
    /// Endpoint to fetch
    pub url: String,
    /// Minimum interval between fetches after a success. Zero disables
    /// the gate entirely: every refresh attempts a fetch.
    pub ttl_seconds: u64,
    /// How the body is interpreted
    pub decode: DecodeMode,
    /// Whether a TLS validation failure may be retried without validation
    pub tls_fallback: bool,
}

impl ItemConfig {
    /// Configuration for a JSON-decoded source
    pub fn structured(url: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            url: url.into(),
            ttl_seconds,
            decode: DecodeMode::Structured,
            tls_fallback: false,
        }
    }

    /// Configuration for a raw-text source
    pub fn raw(url: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            url: url.into(),
            ttl_seconds,
            decode: DecodeMode::Raw,
            tls_fallback: false,
        }
    }

    /// Sets whether insecure retry is allowed for this source
    pub fn with_tls_fallback(mut self, allowed: bool) -> Self {
        self.tls_fallback = allowed;
        self
    }
}

/// One cached external value with its refresh state.
///
/// Only `refresh` mutates `last_success_at`, `stale`, and `value`.
/// `last_success_at` is set exactly when a value has been stored at
/// least once; a failed fetch never clears either.
#[derive(Debug, Clone)]
pub struct CachedItem {
    url: String,
    ttl: Duration,
    decode: DecodeMode,
    tls_fallback: bool,
    last_success_at: Option<DateTime<Utc>>,
    stale: bool,
    value: Option<Payload>,
}

impl CachedItem {
    /// Creates an item and eagerly performs its first fetch so it is
    /// immediately queryable. A failed first fetch leaves the item stale
    /// with no value; it is not an error.
    pub async fn new(config: ItemConfig, fetcher: &dyn Fetcher) -> Self {
        let mut item = Self::idle(config);
        item.refresh(fetcher).await;
        item
    }

    /// Creates an item without attempting a fetch. Starts stale.
    pub fn idle(config: ItemConfig) -> Self {
        Self {
            url: config.url,
            ttl: Duration::seconds(config.ttl_seconds as i64),
            decode: config.decode,
            tls_fallback: config.tls_fallback,
            last_success_at: None,
            // True-equivalent until the first success resolves it.
            stale: true,
            value: None,
        }
    }

    /// Endpoint this item fetches
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the most recent refresh attempt failed
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// The last successfully fetched payload, if any
    pub fn value(&self) -> Option<&Payload> {
        self.value.as_ref()
    }

    /// When the last successful fetch happened, if any
    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at
    }

    /// Refreshes against the current wall clock
    pub async fn refresh(&mut self, fetcher: &dyn Fetcher) -> Outcome {
        self.refresh_at(Utc::now(), fetcher).await
    }

    /// Refreshes with an explicit clock reading.
    ///
    /// Within the TTL window no network activity happens at all. A
    /// failure of any kind (transport, TLS, HTTP status, decode) sets
    /// the stale flag and leaves the stored value and success timestamp
    /// untouched; nothing is propagated to the caller beyond the
    /// returned `Outcome`.
    pub async fn refresh_at(&mut self, now: DateTime<Utc>, fetcher: &dyn Fetcher) -> Outcome {
        if let Some(success_at) = self.last_success_at {
            if now < success_at + self.ttl {
                debug!(url = %self.url, "TTL not expired, skipping fetch");
                return Outcome::Unchanged;
            }
        }

        match self.attempt(fetcher).await {
            Ok(payload) => {
                self.last_success_at = Some(now);
                self.stale = false;
                if self.value.as_ref() == Some(&payload) {
                    debug!(url = %self.url, "fetched value unchanged");
                    Outcome::Unchanged
                } else {
                    debug!(url = %self.url, "stored updated value");
                    self.value = Some(payload);
                    Outcome::Updated
                }
            }
            Err(err) => {
                warn!(url = %self.url, error = %err, "refresh failed, keeping previous value");
                self.stale = true;
                Outcome::Failed
            }
        }
    }

    /// One fetch attempt: TLS fallback retry, status check, decode.
    /// The response is consumed here; nothing outlives the attempt.
    async fn attempt(&self, fetcher: &dyn Fetcher) -> Result<Payload, FetchError> {
        let response = match fetcher.fetch(&self.url, true).await {
            Err(FetchError::TlsValidation(_)) if self.tls_fallback => {
                debug!(url = %self.url, "TLS validation failed, retrying without validation");
                fetcher.fetch(&self.url, false).await?
            }
            other => other?,
        };

        if !response.is_success() {
            return Err(FetchError::HttpStatus(response.status));
        }

        decode_body(self.decode, &response.body)
    }
}

/// Interprets a response body per the item's decode mode
fn decode_body(mode: DecodeMode, body: &str) -> Result<Payload, FetchError> {
    match mode {
        DecodeMode::Structured => serde_json::from_str(body)
            .map(Payload::Structured)
            .map_err(|e| FetchError::Decode(e.to_string())),
        DecodeMode::Raw => Ok(Payload::Raw(body.to_string())),
    }
}
