//! In-memory TTL cache for externally fetched values
//!
//! Each cached item rate-limits its own fetches with a TTL and keeps
//! serving the last known-good value when a refresh fails. The registry
//! groups items under well-known keys, refreshes them in bulk, and
//! reports partial failures without discarding previously valid data.

pub mod item;
pub mod registry;

pub use item::{CachedItem, DecodeMode, ItemConfig, Outcome, Payload};
pub use registry::{
    CacheRegistry, FailurePolicy, RefreshError, RefreshReport, KEY_FEES, KEY_HEIGHT, KEY_PRICES,
    KEY_ZAPS,
};
