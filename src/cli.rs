//! Command-line interface parsing for Blockclock
//!
//! Parses arguments with clap: an optional self-hosted mempool base URL,
//! an optional nostr pubkey to watch, and the watch/strict run modes.

use clap::Parser;

use crate::cache::FailurePolicy;

/// Blockclock - watch Bitcoin network stats from your terminal
#[derive(Parser, Debug)]
#[command(name = "blockclock")]
#[command(about = "Watch Bitcoin block height, prices, fees, and nostr zaps")]
#[command(version)]
pub struct Cli {
    /// Base URL of a self-hosted mempool instance
    ///
    /// When set, data is fetched from this instance instead of
    /// mempool.space, and TLS validation failures are retried without
    /// validation (self-hosted instances often use self-signed
    /// certificates).
    #[arg(long, value_name = "URL")]
    pub mempool_api: Option<String>,

    /// Nostr public key to watch zap totals for
    #[arg(long, value_name = "NPUB")]
    pub npub: Option<String>,

    /// Refresh and reprint every N seconds instead of exiting
    #[arg(long, value_name = "SECONDS")]
    pub watch: Option<u64>,

    /// Treat any refresh failure as a program failure
    #[arg(long)]
    pub strict: bool,

    /// Per-request fetch timeout in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 10)]
    pub timeout: u64,
}

impl Cli {
    /// The self-hosted base URL, normalized without a trailing slash
    pub fn mempool_base(&self) -> Option<&str> {
        self.mempool_api.as_deref().map(|s| s.trim_end_matches('/'))
    }

    /// Failure policy for refresh passes derived from `--strict`
    pub fn failure_policy(&self) -> FailurePolicy {
        if self.strict {
            FailurePolicy::FailOnError
        } else {
            FailurePolicy::ReportOnly
        }
    }
}
