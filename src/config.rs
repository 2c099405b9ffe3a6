/// Runtime configuration for whalewatch
///
/// Loaded from a JSON file (serde defaults for every tunable) plus the
/// `WHALEWATCH_API_KEY` environment variable. `validate()` is the single
/// gatekeeper: the monitor only ever accepts configs that passed it, so the
/// rest of the code can parse the threshold without re-checking.
use crate::errors::ConfigError;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the upstream provider API key
pub const API_KEY_ENV: &str = "WHALEWATCH_API_KEY";

/// Demo-tier key used when no API key is configured
pub const DEMO_API_KEY: &str = "nodit-demo";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Whale threshold in USD expressed as 18-decimal base units
    /// ("10000000000000000000000" = $10,000)
    pub whale_threshold_base_units: String,

    /// Chains to monitor; paired index-wise with `networks`
    pub chains: Vec<String>,
    pub networks: Vec<String>,

    /// Polling interval for the aggregation loop
    pub update_interval_ms: u64,

    /// Lookback window for each aggregation cycle
    pub window_ms: u64,

    /// Transfer-cache TTLs (fresh window, extended stale window)
    pub fresh_ttl_ms: u64,
    pub stale_ttl_ms: u64,

    /// Price-cache TTL
    pub price_ttl_ms: u64,

    /// Transfer-cache entry ceiling; oldest 20% evicted beyond this
    pub max_cache_entries: usize,

    /// Event queue bound and batch size
    pub max_queue_size: usize,
    pub batch_size: usize,

    /// Read-path buffer caps
    pub max_stored_movements: usize,
    pub max_stored_alerts: usize,

    /// Upstream request timeout
    pub request_timeout_ms: u64,

    /// Upstream provider base URL
    pub api_base_url: String,

    /// Provider-side floor for returned transfers (base units)
    pub min_transfer_value: String,

    /// USD value at which a queued movement becomes alert-worthy
    pub alert_threshold_usd: f64,

    /// USD value at which a queued movement triggers downstream analysis
    pub analysis_threshold_usd: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            whale_threshold_base_units: "10000000000000000000000".to_string(), // $10K
            chains: vec![
                "ethereum".to_string(),
                "polygon".to_string(),
                "arbitrum".to_string(),
                "base".to_string(),
                "optimism".to_string(),
            ],
            networks: vec!["mainnet".to_string(); 5],
            update_interval_ms: 30_000,
            window_ms: 24 * 60 * 60 * 1000,
            fresh_ttl_ms: 30 * 60 * 1000,
            stale_ttl_ms: 2 * 60 * 60 * 1000,
            price_ttl_ms: 60 * 60 * 1000,
            max_cache_entries: 300,
            max_queue_size: 1000,
            batch_size: 50,
            max_stored_movements: 100,
            max_stored_alerts: 100,
            request_timeout_ms: 15_000,
            api_base_url: "https://web3.nodit.io/v1".to_string(),
            min_transfer_value: "10000000000000000".to_string(),
            alert_threshold_usd: 1_000_000.0,
            analysis_threshold_usd: 10_000_000.0,
        }
    }
}

impl MonitorConfig {
    /// Read a config file, falling back to defaults when it does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let data = fs::read_to_string(path_ref).map_err(|e| ConfigError::Io {
            path: path_ref.display().to_string(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path_ref.display().to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::Invalid {
                field: "chains",
                reason: "at least one chain is required".to_string(),
            });
        }
        if self.chains.len() != self.networks.len() {
            return Err(ConfigError::Invalid {
                field: "networks",
                reason: format!(
                    "expected {} entries to match chains, got {}",
                    self.chains.len(),
                    self.networks.len()
                ),
            });
        }
        if U256::from_dec_str(&self.whale_threshold_base_units).is_err() {
            return Err(ConfigError::Invalid {
                field: "whale_threshold_base_units",
                reason: format!("'{}' is not a base-10 integer", self.whale_threshold_base_units),
            });
        }
        if U256::from_dec_str(&self.min_transfer_value).is_err() {
            return Err(ConfigError::Invalid {
                field: "min_transfer_value",
                reason: format!("'{}' is not a base-10 integer", self.min_transfer_value),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_queue_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.fresh_ttl_ms > self.stale_ttl_ms {
            return Err(ConfigError::Invalid {
                field: "stale_ttl_ms",
                reason: "stale TTL must be at least the fresh TTL".to_string(),
            });
        }
        Ok(())
    }

    /// Whale threshold as an exact 256-bit integer; valid after `validate()`
    pub fn whale_threshold_wei(&self) -> U256 {
        U256::from_dec_str(&self.whale_threshold_base_units).unwrap_or_else(|_| U256::max_value())
    }

    /// Chain/network pairs in configured order
    pub fn chain_pairs(&self) -> Vec<(String, String)> {
        self.chains
            .iter()
            .cloned()
            .zip(self.networks.iter().cloned())
            .collect()
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn fresh_ttl(&self) -> Duration {
        Duration::from_millis(self.fresh_ttl_ms)
    }

    pub fn stale_ttl(&self) -> Duration {
        Duration::from_millis(self.stale_ttl_ms)
    }

    pub fn price_ttl(&self) -> Duration {
        Duration::from_millis(self.price_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Provider API key from the environment, falling back to the demo key
pub fn api_key_from_env() -> String {
    env::var(API_KEY_ENV).unwrap_or_else(|_| DEMO_API_KEY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chains.len(), config.networks.len());
        assert_eq!(
            config.whale_threshold_wei(),
            U256::from_dec_str("10000000000000000000000").unwrap()
        );
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = MonitorConfig::load("/nonexistent/whalewatch.json").unwrap();
        assert_eq!(config.update_interval_ms, 30_000);
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"chains": ["ethereum"], "networks": ["mainnet"], "batch_size": 10}}"#
        )
        .unwrap();
        let config = MonitorConfig::load(file.path()).unwrap();
        assert_eq!(config.chains, vec!["ethereum"]);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_queue_size, 1000); // default
    }

    #[test]
    fn test_validate_rejects_mismatched_networks() {
        let config = MonitorConfig {
            chains: vec!["ethereum".to_string(), "polygon".to_string()],
            networks: vec!["mainnet".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = MonitorConfig {
            whale_threshold_base_units: "10.5e3".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
