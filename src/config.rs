//! Configuration for the ledger engine.
//!
//! Loads policy values from environment variables with sensible defaults.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;

/// Default refund lead time for fee-bearing entries, in seconds.
const DEFAULT_REFUND_LEAD_TIME_SECS: i64 = 600;

/// Default page size for transaction-history queries.
const DEFAULT_HISTORY_PAGE_SIZE: usize = 25;

/// Default price of one coin, in cents.
const DEFAULT_COIN_PRICE_CENTS: u64 = 10;

/// Engine policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Minimum lead time before tournament start for a fee-bearing entry to be
    /// refunded on leave. Zero-fee entries are not subject to this lead time
    /// and may leave any time strictly before start.
    pub refund_lead_time_secs: i64,
    /// Default number of ledger entries per history page.
    pub history_page_size: usize,
    /// Price of one coin in cents, used when creating payment intents.
    pub coin_price_cents: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            refund_lead_time_secs: env::var("ARENA_REFUND_LEAD_TIME_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_REFUND_LEAD_TIME_SECS),
            history_page_size: env::var("ARENA_HISTORY_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HISTORY_PAGE_SIZE),
            coin_price_cents: env::var("ARENA_COIN_PRICE_CENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_COIN_PRICE_CENTS),
        }
    }

    /// The refund lead time as a `chrono::Duration`.
    #[must_use]
    pub fn refund_lead_time(&self) -> Duration {
        Duration::seconds(self.refund_lead_time_secs.max(0))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refund_lead_time_secs: DEFAULT_REFUND_LEAD_TIME_SECS,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            coin_price_cents: DEFAULT_COIN_PRICE_CENTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.refund_lead_time(), Duration::seconds(600));
        assert_eq!(config.history_page_size, 25);
    }

    #[test]
    fn negative_lead_time_clamps_to_zero() {
        let config = Config {
            refund_lead_time_secs: -5,
            ..Config::default()
        };
        assert_eq!(config.refund_lead_time(), Duration::zero());
    }
}
