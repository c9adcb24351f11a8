//! Tunables for one network refresh cycle

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_MIN_SIMILARITY: f64 = 0.1;
pub const DEFAULT_LINK_CAP: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_WALLET_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LEADERBOARD_LIMIT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Minimum Jaccard similarity for a connection to be kept, in [0, 1]
    pub min_similarity: f64,
    /// Global cap on graph links (strongest first)
    pub link_cap: usize,
    /// Wallets fetched concurrently per batch
    pub batch_size: usize,
    /// Per-wallet retrieval timeout
    pub wallet_timeout_secs: u64,
    /// Pause between fetch batches
    pub batch_delay_ms: u64,
    /// How many traders to pull from the leaderboard
    pub leaderboard_limit: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            min_similarity: DEFAULT_MIN_SIMILARITY,
            link_cap: DEFAULT_LINK_CAP,
            batch_size: DEFAULT_BATCH_SIZE,
            wallet_timeout_secs: DEFAULT_WALLET_TIMEOUT_SECS,
            batch_delay_ms: 0,
            leaderboard_limit: DEFAULT_LEADERBOARD_LIMIT,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(EngineError::InvalidConfig(format!(
                "min_similarity must be within [0, 1], got {}",
                self.min_similarity
            )));
        }
        if self.batch_size == 0 {
            return Err(EngineError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.wallet_timeout_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "wallet_timeout_secs must be at least 1".into(),
            ));
        }
        if self.leaderboard_limit == 0 {
            return Err(EngineError::InvalidConfig(
                "leaderboard_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn wallet_timeout(&self) -> Duration {
        Duration::from_secs(self.wallet_timeout_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NetworkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_similarity, 0.1);
        assert_eq!(config.link_cap, 100);
        assert_eq!(config.batch_size, 5);
    }

    #[test]
    fn test_rejects_bad_threshold() {
        for bad in [-0.1, 1.5, f64::NAN] {
            let config = NetworkConfig {
                min_similarity: bad,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_rejects_zero_batch() {
        let config = NetworkConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: NetworkConfig = serde_json::from_str(r#"{"link_cap": 25}"#).unwrap();
        assert_eq!(config.link_cap, 25);
        assert_eq!(config.min_similarity, DEFAULT_MIN_SIMILARITY);
    }
}
