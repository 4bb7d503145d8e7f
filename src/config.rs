use serde::Deserialize;

use crate::ledger::models::Network;

/// Runtime configuration, loaded from the environment
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// GraphQL backend used to register swap-block files and list open orders
    pub api_url: String,
    /// Ledger node REST endpoint
    pub node_url: String,
    pub network: Network,
    /// Counterparty (DEX) account that signs the matching side of every swap
    pub dex_address: String,
    /// Native token of the ledger, used for fees and the refill balance gate
    pub base_token: String,
    /// Where the persisted escrow pool lives
    pub pool_state_path: String,
    pub pool: PoolSettings,
    pub extension: ExtensionSettings,
}

/// Escrow pool sizing
#[derive(Debug, Deserialize, Clone)]
pub struct PoolSettings {
    /// Target size when the pool feature is disabled
    pub min_pool_size: usize,
    /// Target size when the pool feature is enabled
    pub max_pool_size: usize,
    /// Accounts created per refill invocation, in a single transaction
    pub refill_batch: usize,
    /// Seconds between refill ticks
    pub refill_period_secs: u64,
}

/// Order extension cadence
#[derive(Debug, Deserialize, Clone)]
pub struct ExtensionSettings {
    /// Minutes between consecutive extension blocks of one order
    pub minutes_apart: u64,
    /// How far forward each extension run extends an order
    pub extension_days: u64,
    /// Orders expiring within this many days are extended
    pub auto_extend_threshold_days: u64,
    /// Lookahead window for the open-orders query
    pub lookahead_days: u64,
    /// Seconds between extension sweeps
    pub check_orders_period_secs: u64,
    /// Blocks built concurrently per batch during generation
    pub generation_batch: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_pool_size: 1,
            max_pool_size: 120,
            refill_batch: 30,
            refill_period_secs: 60,
        }
    }
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            minutes_apart: 4,
            extension_days: 1,
            auto_extend_threshold_days: 6,
            lookahead_days: 6,
            check_orders_period_secs: 30,
            generation_batch: 100,
        }
    }
}

impl ExtensionSettings {
    /// Number of extension blocks generated per run
    pub fn blocks_per_run(&self) -> u64 {
        (self.extension_days * 24 * 60) / self.minutes_apart
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let network = match std::env::var("NETWORK").as_deref() {
            Ok("main") => Network::Main,
            _ => Network::Test,
        };

        Ok(Self {
            api_url: std::env::var("API_URL")
                .unwrap_or_else(|_| "http://0.0.0.0:8080".to_string()),
            node_url: std::env::var("NODE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9090/api".to_string()),
            network,
            dex_address: std::env::var("DEX_ADDRESS").unwrap_or_default(),
            base_token: std::env::var("BASE_TOKEN").unwrap_or_default(),
            pool_state_path: std::env::var("POOL_STATE_PATH")
                .unwrap_or_else(|_| "escrow_pool.json".to_string()),
            pool: PoolSettings::default(),
            extension: ExtensionSettings::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_per_run() {
        // 1 day at 4-minute spacing
        let settings = ExtensionSettings::default();
        assert_eq!(settings.blocks_per_run(), 360);
    }
}
