//! Blockclock - watch Bitcoin network stats from your terminal
//!
//! Polls mempool.space (or a self-hosted instance) for block height,
//! prices, and recommended fees, plus optionally nostr zap stats, and
//! prints the cached values. Previously fetched values keep being shown
//! when a source is temporarily unreachable.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use blockclock::cache::CacheRegistry;
use blockclock::cli::Cli;
use blockclock::fetch::{Fetcher, HttpFetcher};
use blockclock::sources;

/// Prints the current cached stats, noting any stale sources
fn print_summary(registry: &CacheRegistry) {
    match registry.block_height() {
        Some(height) => println!("block height: {height}"),
        None => println!("block height: unavailable"),
    }

    for currency in ["USD", "EUR"] {
        if let Some(price) = registry.price(currency) {
            println!("price {currency}: {price:.0}");
        }
    }

    if let Some(fees) = registry.fees() {
        let fee = |key: &str| fees.get(key).and_then(Value::as_u64);
        if let (Some(fastest), Some(half_hour), Some(hour)) =
            (fee("fastestFee"), fee("halfHourFee"), fee("hourFee"))
        {
            println!("fees (sat/vB): fastest {fastest}, half hour {half_hour}, hour {hour}");
        }
    }

    if let Some(zaps) = registry.zap_count() {
        println!("zaps received: {zaps}");
    }

    let stale = registry.list_stale();
    if !stale.is_empty() {
        let mut keys: Vec<String> = stale.into_iter().collect();
        keys.sort();
        println!("stale sources: {}", keys.join(", "));
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let fetcher = match HttpFetcher::with_timeout(Duration::from_secs(cli.timeout)) {
        Ok(fetcher) => Arc::new(fetcher) as Arc<dyn Fetcher>,
        Err(err) => {
            eprintln!("failed to build HTTP client: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut registry = CacheRegistry::new(fetcher);
    sources::initialize(&mut registry, cli.mempool_base()).await;
    if let Some(npub) = &cli.npub {
        sources::set_nostr_pubkey(&mut registry, npub).await;
    }

    // Initialization already performed the first fetch for every item.
    print_summary(&registry);

    let Some(interval_seconds) = cli.watch else {
        if cli.strict && !registry.list_stale().is_empty() {
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    };

    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
    // The first tick completes immediately; consume it so the loop waits.
    interval.tick().await;

    loop {
        interval.tick().await;
        match registry.refresh_all(cli.failure_policy()).await {
            Ok(report) => {
                if !report.refreshed.is_empty() || !report.failed.is_empty() {
                    print_summary(&registry);
                }
            }
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        }
    }
}
