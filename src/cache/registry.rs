//! Named registry of cached items
//!
//! Owns the map of `CachedItem`s, orchestrates bulk refresh with
//! bounded concurrency, aggregates per-item outcomes into
//! refreshed/failed key sets, and exposes typed accessors for the
//! well-known keys. Individual item failures are reported, never fatal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::item::{CachedItem, ItemConfig, Outcome};
use crate::fetch::Fetcher;

/// Well-known registry keys
pub const KEY_PRICES: &str = "prices";
pub const KEY_FEES: &str = "fees";
pub const KEY_HEIGHT: &str = "height";
pub const KEY_ZAPS: &str = "zaps";

/// Cap on simultaneous outbound fetches during a bulk refresh
const MAX_CONCURRENT_REFRESHES: usize = 4;

/// Whether a refresh pass with failures should fail as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log failures and return the report (the default)
    #[default]
    ReportOnly,
    /// Return an error when any item failed to refresh
    FailOnError,
}

/// Outcome of one refresh pass over the whole registry.
///
/// Every key lands in at most one set; keys whose item was unchanged
/// (TTL still running, or identical payload) appear in neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Keys whose value was updated
    pub refreshed: HashSet<String>,
    /// Keys whose refresh attempt failed
    pub failed: HashSet<String>,
}

/// A refresh pass had failures and the caller opted into failing on them
#[derive(Debug, Error)]
#[error("cache refresh had failures: {}", joined_keys(&.0.failed))]
pub struct RefreshError(pub RefreshReport);

/// Sorted, comma-joined key list for log and error messages
fn joined_keys(keys: &HashSet<String>) -> String {
    let mut sorted: Vec<&str> = keys.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

/// Registry of cached external values keyed by name.
///
/// Holds the shared fetch capability it builds items with. All reads go
/// through the typed accessors or `get`; all of them tolerate missing
/// keys by returning `None`.
pub struct CacheRegistry {
    fetcher: Arc<dyn Fetcher>,
    items: HashMap<String, CachedItem>,
}

impl CacheRegistry {
    /// Creates an empty registry around an injected fetch capability
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            items: HashMap::new(),
        }
    }

    /// The fetch capability items are constructed against
    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// Replaces the entire item set. The new map is fully built by the
    /// caller before this swap, so no half-updated set is ever visible.
    pub fn replace_all(&mut self, items: HashMap<String, CachedItem>) {
        self.items = items;
    }

    /// Inserts or overwrites a single entry without touching the rest
    pub fn insert(&mut self, key: impl Into<String>, item: CachedItem) {
        self.items.insert(key.into(), item);
    }

    /// Builds an item (eager first fetch included) and inserts it
    pub async fn register(&mut self, key: impl Into<String>, config: ItemConfig) {
        let item = CachedItem::new(config, self.fetcher.as_ref()).await;
        self.items.insert(key.into(), item);
    }

    /// Looks up one entry
    pub fn get(&self, key: &str) -> Option<&CachedItem> {
        self.items.get(key)
    }

    /// Registered keys, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Refreshes every item and aggregates the outcomes.
    ///
    /// Items refresh concurrently up to `MAX_CONCURRENT_REFRESHES`; each
    /// task holds the exclusive borrow of its own item, so no item is
    /// ever refreshed by two tasks at once. This call always completes;
    /// with `FailurePolicy::FailOnError` a non-empty failed set is
    /// converted into an error that still carries the full report.
    pub async fn refresh_all(
        &mut self,
        policy: FailurePolicy,
    ) -> Result<RefreshReport, RefreshError> {
        let fetcher = Arc::clone(&self.fetcher);
        let outcomes: Vec<(&String, Outcome)> = stream::iter(self.items.iter_mut())
            .map(|(key, item)| {
                let fetcher = Arc::clone(&fetcher);
                async move { (key, item.refresh(fetcher.as_ref()).await) }
            })
            .buffer_unordered(MAX_CONCURRENT_REFRESHES)
            .collect()
            .await;

        let mut report = RefreshReport::default();
        for (key, outcome) in outcomes {
            match outcome {
                Outcome::Updated => {
                    report.refreshed.insert(key.clone());
                }
                Outcome::Failed => {
                    report.failed.insert(key.clone());
                }
                Outcome::Unchanged => {}
            }
        }

        if !report.failed.is_empty() {
            warn!(keys = %joined_keys(&report.failed), "refresh pass had failures");
            if policy == FailurePolicy::FailOnError {
                return Err(RefreshError(report));
            }
        }
        Ok(report)
    }

    /// Keys whose most recent refresh attempt failed
    pub fn list_stale(&self) -> HashSet<String> {
        self.items
            .iter()
            .filter(|(_, item)| item.is_stale())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Current block height, parsed from the raw `height` value
    pub fn block_height(&self) -> Option<u64> {
        let raw = self.items.get(KEY_HEIGHT)?.value()?.as_raw()?;
        raw.trim().parse().ok()
    }

    /// Price in the given currency (e.g. "USD", "EUR") from the
    /// structured `prices` value
    pub fn price(&self, currency: &str) -> Option<f64> {
        self.items
            .get(KEY_PRICES)?
            .value()?
            .as_structured()?
            .get(currency)?
            .as_f64()
    }

    /// The recommended fee schedule verbatim, as fetched
    pub fn fees(&self) -> Option<Value> {
        Some(self.items.get(KEY_FEES)?.value()?.as_structured()?.clone())
    }

    /// Total zaps received for the watched nostr profile.
    ///
    /// The stats payload keys its entries by hex pubkey; since this
    /// registry watches one profile, `stats` must hold exactly one entry.
    /// Anything else means the response shape changed, and the accessor
    /// returns `None` instead of guessing.
    pub fn zap_count(&self) -> Option<u64> {
        let stats = self
            .items
            .get(KEY_ZAPS)?
            .value()?
            .as_structured()?
            .get("stats")?
            .as_object()?;
        if stats.len() != 1 {
            return None;
        }
        let (_pubkey, profile) = stats.iter().next()?;
        profile.get("zaps_received")?.get("count")?.as_u64()
    }
}
