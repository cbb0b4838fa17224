//! Runtime configuration for the book mirror

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use types::ids::MarketId;

use crate::error::SyncError;
use crate::pending::OverflowPolicy;
use crate::sequence::GapPolicy;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "BOOK_SYNC_";

/// Settings for one mirrored product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Product to mirror.
    pub symbol: MarketId,
    /// REST book level requested from the venue (3 = every order).
    pub snapshot_depth: u8,
    pub gap_policy: GapPolicy,
    /// Max events held while awaiting a snapshot.
    pub pending_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Bounded trade fan-out.
    pub trade_channel_capacity: usize,
    /// First snapshot retry delay.
    pub snapshot_retry_initial_ms: u64,
    /// Retry delay cap.
    pub snapshot_retry_max_ms: u64,
    /// Fetch attempts before giving up; 0 retries forever.
    pub snapshot_max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            symbol: MarketId::new("BTC-USD"),
            snapshot_depth: 3,
            gap_policy: GapPolicy::ApplyAndContinue,
            pending_capacity: 100_000,
            overflow_policy: OverflowPolicy::Block,
            trade_channel_capacity: 1024,
            snapshot_retry_initial_ms: 250,
            snapshot_retry_max_ms: 10_000,
            snapshot_max_attempts: 0,
        }
    }
}

impl SyncConfig {
    /// Defaults overlaid with any `BOOK_SYNC_*` environment variables.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by full variable
    /// name (`BOOK_SYNC_SYMBOL`, ...).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SyncError> {
        let mut config = Self::default();
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(raw) = get("SYMBOL") {
            config.symbol = MarketId::try_new(raw.as_str())
                .ok_or_else(|| SyncError::Config(format!("invalid symbol: {raw}")))?;
        }
        if let Some(raw) = get("SNAPSHOT_DEPTH") {
            config.snapshot_depth = parse("SNAPSHOT_DEPTH", &raw)?;
        }
        if let Some(raw) = get("GAP_POLICY") {
            config.gap_policy = raw.parse()?;
        }
        if let Some(raw) = get("PENDING_CAPACITY") {
            config.pending_capacity = parse("PENDING_CAPACITY", &raw)?;
        }
        if let Some(raw) = get("OVERFLOW_POLICY") {
            config.overflow_policy = raw.parse()?;
        }
        if let Some(raw) = get("TRADE_CHANNEL_CAPACITY") {
            config.trade_channel_capacity = parse("TRADE_CHANNEL_CAPACITY", &raw)?;
        }
        if let Some(raw) = get("SNAPSHOT_RETRY_INITIAL_MS") {
            config.snapshot_retry_initial_ms = parse("SNAPSHOT_RETRY_INITIAL_MS", &raw)?;
        }
        if let Some(raw) = get("SNAPSHOT_RETRY_MAX_MS") {
            config.snapshot_retry_max_ms = parse("SNAPSHOT_RETRY_MAX_MS", &raw)?;
        }
        if let Some(raw) = get("SNAPSHOT_MAX_ATTEMPTS") {
            config.snapshot_max_attempts = parse("SNAPSHOT_MAX_ATTEMPTS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.pending_capacity == 0 {
            return Err(SyncError::Config("pending_capacity must be > 0".into()));
        }
        if self.trade_channel_capacity == 0 {
            return Err(SyncError::Config("trade_channel_capacity must be > 0".into()));
        }
        if !(1..=3).contains(&self.snapshot_depth) {
            return Err(SyncError::Config(format!(
                "snapshot_depth must be 1, 2 or 3, got {}",
                self.snapshot_depth
            )));
        }
        if self.snapshot_retry_initial_ms == 0 {
            return Err(SyncError::Config("snapshot_retry_initial_ms must be > 0".into()));
        }
        if self.snapshot_retry_initial_ms > self.snapshot_retry_max_ms {
            return Err(SyncError::Config(format!(
                "snapshot_retry_initial_ms ({}) exceeds snapshot_retry_max_ms ({})",
                self.snapshot_retry_initial_ms, self.snapshot_retry_max_ms
            )));
        }
        Ok(())
    }

    pub fn retry_initial(&self) -> Duration {
        Duration::from_millis(self.snapshot_retry_initial_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.snapshot_retry_max_ms)
    }
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T, SyncError> {
    raw.trim()
        .parse()
        .map_err(|_| SyncError::Config(format!("{ENV_PREFIX}{name}: invalid value {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.symbol.as_str(), "BTC-USD");
        assert_eq!(config.gap_policy, GapPolicy::ApplyAndContinue);
        assert_eq!(config.retry_initial(), Duration::from_millis(250));
    }

    #[test]
    fn test_env_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("BOOK_SYNC_SYMBOL", "ETH-USD"),
            ("BOOK_SYNC_GAP_POLICY", "force_resync"),
            ("BOOK_SYNC_OVERFLOW_POLICY", "drop_oldest"),
            ("BOOK_SYNC_PENDING_CAPACITY", "500"),
            ("BOOK_SYNC_SNAPSHOT_MAX_ATTEMPTS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.symbol.as_str(), "ETH-USD");
        assert_eq!(config.gap_policy, GapPolicy::ForceResync);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(config.pending_capacity, 500);
        assert_eq!(config.snapshot_max_attempts, 5);
        assert_eq!(config.trade_channel_capacity, 1024);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        assert!(SyncConfig::from_lookup(lookup(&[("BOOK_SYNC_PENDING_CAPACITY", "lots")])).is_err());
        assert!(SyncConfig::from_lookup(lookup(&[("BOOK_SYNC_SYMBOL", "BTCUSD")])).is_err());
        assert!(SyncConfig::from_lookup(lookup(&[("BOOK_SYNC_PENDING_CAPACITY", "0")])).is_err());
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let config = SyncConfig {
            snapshot_retry_initial_ms: 5_000,
            snapshot_retry_max_ms: 1_000,
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"symbol":"BTC-USD","gap_policy":"force_resync"}"#).unwrap();
        assert_eq!(config.gap_policy, GapPolicy::ForceResync);
        assert_eq!(config.pending_capacity, 100_000);
    }
}
