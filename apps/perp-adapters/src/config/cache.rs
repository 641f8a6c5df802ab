//! Freshness windows per data class.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::infrastructure::cache::CachePolicy;

/// Cache windows for adapter reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Market lists and static market parameters.
    #[serde(default = "default_markets")]
    pub markets: CacheWindow,
    /// Prices and tickers.
    #[serde(default = "default_prices")]
    pub prices: CacheWindow,
    /// Open interest, funding and borrow rates.
    #[serde(default = "default_state")]
    pub state: CacheWindow,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            markets: default_markets(),
            prices: default_prices(),
            state: default_state(),
        }
    }
}

/// Stale / cache time pair in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheWindow {
    /// Serve without refetching while younger than this.
    pub stale_ms: u64,
    /// Serve as a fallback on fetch failure while younger than this.
    pub cache_ms: u64,
}

impl CacheWindow {
    /// Convert to a cache policy.
    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        CachePolicy::new(
            Duration::from_millis(self.stale_ms),
            Duration::from_millis(self.cache_ms),
        )
    }
}

const fn default_markets() -> CacheWindow {
    CacheWindow {
        stale_ms: 300_000,
        cache_ms: 3_600_000,
    }
}

const fn default_prices() -> CacheWindow {
    CacheWindow {
        stale_ms: 2_000,
        cache_ms: 30_000,
    }
}

const fn default_state() -> CacheWindow {
    CacheWindow {
        stale_ms: 10_000,
        cache_ms: 60_000,
    }
}
