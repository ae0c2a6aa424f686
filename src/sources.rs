//! Source configuration for the stats registry
//!
//! Knows which endpoints back each well-known cache key, their TTLs, and
//! how their bodies decode. Supports the managed mempool.space instance
//! (strict TLS) or a self-hosted one (insecure retry allowed, since
//! self-hosted instances commonly run self-signed certificates).

use std::collections::HashMap;

use tracing::info;

use crate::cache::{
    CacheRegistry, CachedItem, ItemConfig, KEY_FEES, KEY_HEIGHT, KEY_PRICES, KEY_ZAPS,
};

/// Managed mempool instance used when no base URL is supplied
pub const MEMPOOL_DEFAULT_BASE: &str = "https://mempool.space";

/// nostr.band profile-stats endpoint prefix
const NOSTR_STATS_BASE: &str = "https://api.nostr.band/v0/stats/profile/";

/// Per-source TTLs in seconds
const PRICES_TTL_SECONDS: u64 = 300;
const FEES_TTL_SECONDS: u64 = 120;
const HEIGHT_TTL_SECONDS: u64 = 180;
const ZAPS_TTL_SECONDS: u64 = 300;

/// The mempool item set for a given base URL
pub fn mempool_item_configs(base: &str, tls_fallback: bool) -> Vec<(&'static str, ItemConfig)> {
    vec![
        (
            KEY_PRICES,
            ItemConfig::structured(format!("{base}/api/v1/prices"), PRICES_TTL_SECONDS)
                .with_tls_fallback(tls_fallback),
        ),
        (
            KEY_FEES,
            ItemConfig::structured(
                format!("{base}/api/v1/fees/recommended"),
                FEES_TTL_SECONDS,
            )
            .with_tls_fallback(tls_fallback),
        ),
        (
            KEY_HEIGHT,
            ItemConfig::raw(format!("{base}/api/blocks/tip/height"), HEIGHT_TTL_SECONDS)
                .with_tls_fallback(tls_fallback),
        ),
    ]
}

/// (Re)initializes the registry's mempool sources.
///
/// Builds the complete replacement item set (each item performing its
/// eager first fetch) before swapping it in, discarding all previous
/// entries. With no base URL the managed instance is used and TLS
/// validation is strict; a self-hosted base enables the insecure retry
/// for every item created here.
pub async fn initialize(registry: &mut CacheRegistry, mempool_api: Option<&str>) {
    let (base, tls_fallback) = match mempool_api {
        Some(base) => {
            info!(base, "using self-hosted mempool instance");
            (base, true)
        }
        None => {
            info!("using managed mempool.space instance");
            (MEMPOOL_DEFAULT_BASE, false)
        }
    };

    let mut items = HashMap::new();
    for (key, config) in mempool_item_configs(base, tls_fallback) {
        items.insert(key.to_string(), CachedItem::new(config, registry.fetcher()).await);
    }
    registry.replace_all(items);
}

/// Registers the zap-stats source for a nostr public key.
///
/// Additive: the mempool entries are untouched. Calling again with a
/// different key replaces just this entry.
pub async fn set_nostr_pubkey(registry: &mut CacheRegistry, npub: &str) {
    info!(npub, "watching nostr zap stats");
    registry
        .register(
            KEY_ZAPS,
            ItemConfig::structured(format!("{NOSTR_STATS_BASE}{npub}"), ZAPS_TTL_SECONDS),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::DecodeMode;
    use crate::fetch::testing::{ok_body, ScriptedFetcher};
    use crate::fetch::Fetcher;

    fn config_for<'a>(
        configs: &'a [(&'static str, ItemConfig)],
        key: &str,
    ) -> &'a ItemConfig {
        &configs.iter().find(|(k, _)| *k == key).unwrap().1
    }

    #[test]
    fn test_mempool_configs_derive_urls_and_ttls() {
        let configs = mempool_item_configs(MEMPOOL_DEFAULT_BASE, false);
        assert_eq!(configs.len(), 3);

        let prices = config_for(&configs, KEY_PRICES);
        assert_eq!(prices.url, "https://mempool.space/api/v1/prices");
        assert_eq!(prices.ttl_seconds, 300);
        assert_eq!(prices.decode, DecodeMode::Structured);

        let fees = config_for(&configs, KEY_FEES);
        assert_eq!(fees.url, "https://mempool.space/api/v1/fees/recommended");
        assert_eq!(fees.ttl_seconds, 120);

        let height = config_for(&configs, KEY_HEIGHT);
        assert_eq!(height.url, "https://mempool.space/api/blocks/tip/height");
        assert_eq!(height.ttl_seconds, 180);
        assert_eq!(height.decode, DecodeMode::Raw);
    }

    #[test]
    fn test_managed_instance_keeps_tls_strict() {
        for (_, config) in mempool_item_configs(MEMPOOL_DEFAULT_BASE, false) {
            assert!(!config.tls_fallback);
        }
    }

    #[test]
    fn test_self_hosted_instance_allows_insecure_retry() {
        for (_, config) in mempool_item_configs("https://umbrel.local:3006", true) {
            assert!(config.tls_fallback);
            assert!(config.url.starts_with("https://umbrel.local:3006/"));
        }
    }

    #[tokio::test]
    async fn test_initialize_replaces_previous_item_set() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let mut registry = CacheRegistry::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>);
        registry.insert(
            "leftover",
            CachedItem::idle(ItemConfig::raw("https://old.test", 60)),
        );

        fetcher.enqueue("https://mempool.space/api/v1/prices", ok_body("{}"));
        fetcher.enqueue(
            "https://mempool.space/api/v1/fees/recommended",
            ok_body("{}"),
        );
        fetcher.enqueue("https://mempool.space/api/blocks/tip/height", ok_body("1"));

        initialize(&mut registry, None).await;

        assert!(registry.get("leftover").is_none());
        assert_eq!(registry.len(), 3);
        assert!(registry.get(KEY_PRICES).is_some());
        assert!(registry.get(KEY_FEES).is_some());
        assert!(registry.get(KEY_HEIGHT).is_some());
    }

    #[tokio::test]
    async fn test_set_nostr_pubkey_is_additive() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let mut registry = CacheRegistry::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>);
        registry.insert(
            KEY_HEIGHT,
            CachedItem::idle(ItemConfig::raw("https://mempool.space/api/blocks/tip/height", 180)),
        );

        let url = "https://api.nostr.band/v0/stats/profile/npub1xyz";
        fetcher.enqueue(url, ok_body(r#"{"stats":{}}"#));
        set_nostr_pubkey(&mut registry, "npub1xyz").await;

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(KEY_ZAPS).unwrap().url(), url);
        assert!(registry.get(KEY_HEIGHT).is_some());
    }
}
