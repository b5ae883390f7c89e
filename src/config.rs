//! Configuration module for the volume bot
//!
//! This module handles configuration loading from TOML files and
//! environment variables, and validates the trading parameters.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::errors::{EngineError, EngineResult};
use crate::types::TradeMode;

/// Jito bundles carry at most five transactions; one is the tip transfer
pub const MAX_SWAPS_PER_BUNDLE: usize = 4;

/// Raydium CLMM program (mainnet)
pub const CLMM_PROGRAM_MAINNET: &str = "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK";

/// Raydium CLMM program (devnet)
pub const CLMM_PROGRAM_DEVNET: &str = "devi51mZmdwUJGU9hjN27vEz64Gps7uUefqxg27EAtH";

const ENV_PREFIX: &str = "VOLUME_BOT_";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub pool: PoolConfig,
    pub trading: TradingConfig,
    pub session: SessionConfig,
    pub bundle: BundleConfig,
    pub wallets: WalletsConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Max retries when fetching the pool context
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// CLMM pool address
    pub pool_id: String,

    /// Mint of the traded token
    pub token_mint: String,

    /// Programs accepted as CLMM pools
    #[serde(default = "default_clmm_programs")]
    pub clmm_programs: Vec<String>,

    #[serde(default = "default_pool_api")]
    pub api_base: String,

    #[serde(default = "default_trade_api")]
    pub trade_api_base: String,

    /// Refetch the quote context once it is older than this
    #[serde(default)]
    pub context_max_age_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_mode")]
    pub mode: TradeMode,

    /// Buy quantity range in whole tokens
    pub min_buy_quantity: f64,
    pub max_buy_quantity: f64,

    /// Sell quantity range in whole tokens
    pub min_sell_quantity: f64,
    pub max_sell_quantity: f64,

    /// Slippage tolerance as a fraction (0.01 = 1%)
    #[serde(default = "default_slippage")]
    pub slippage: f64,

    /// Lamports kept back for network fees on every trade
    #[serde(default = "default_buffer_lamports")]
    pub buffer_lamports: u64,

    /// Wallets below this balance are dust and get evicted
    #[serde(default = "default_min_lamports")]
    pub min_lamports: u64,

    #[serde(default = "default_compute_unit_price")]
    pub compute_unit_price_micro_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime range in seconds
    pub min_lifetime_secs: u64,
    pub max_lifetime_secs: u64,

    /// Wait between cycles in milliseconds
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Swap transactions per bundle (the tip transaction comes on top)
    #[serde(default = "default_bundle_size")]
    pub max_bundle_size: usize,

    /// Tip paid to the block engine, in lamports
    #[serde(default = "default_tip")]
    pub tip_lamports: u64,

    #[serde(default = "default_block_engines")]
    pub block_engine_urls: Vec<String>,

    /// Keypair paying the bundle tip
    pub fee_payer_keypair_path: String,

    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletsConfig {
    /// JSON file with `[{ "secretKey": "<base58>" }, ...]`
    pub path: String,

    pub number_of_wallets: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub enable_metrics: bool,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: default_metrics_port(),
        }
    }
}

// Default value functions
fn default_rpc_timeout() -> u64 { 30 }
fn default_max_retries() -> usize { 3 }
fn default_mode() -> TradeMode { TradeMode::Mixed }
fn default_slippage() -> f64 { 0.01 }
fn default_buffer_lamports() -> u64 { 5_000_000 }
fn default_min_lamports() -> u64 { 1_500_000 }
fn default_compute_unit_price() -> u64 { 100_000 }
fn default_bundle_size() -> usize { MAX_SWAPS_PER_BUNDLE }
fn default_tip() -> u64 { 100_000 }
fn default_confirm_poll_ms() -> u64 { 2_000 }
fn default_metrics_port() -> u16 { 9090 }
fn default_pool_api() -> String { "https://api-v3.raydium.io".to_string() }
fn default_trade_api() -> String { "https://transaction-v1.raydium.io".to_string() }
fn default_clmm_programs() -> Vec<String> {
    vec![CLMM_PROGRAM_MAINNET.to_string(), CLMM_PROGRAM_DEVNET.to_string()]
}
fn default_block_engines() -> Vec<String> {
    vec![
        "https://mainnet.block-engine.jito.wtf".to_string(),
        "https://amsterdam.mainnet.block-engine.jito.wtf".to_string(),
        "https://ny.mainnet.block-engine.jito.wtf".to_string(),
    ]
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with `.env` and environment variable overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_override("RPC_ENDPOINT") {
            self.rpc.endpoint = v;
        }
        if let Some(v) = env_override("POOL_ID") {
            self.pool.pool_id = v;
        }
        if let Some(v) = env_override("TOKEN_MINT") {
            self.pool.token_mint = v;
        }
        if let Some(v) = env_override("WALLETS_PATH") {
            self.wallets.path = v;
        }
        if let Some(v) = env_override("FEE_PAYER_KEYPAIR") {
            self.bundle.fee_payer_keypair_path = v;
        }
        if let Some(v) = env_override("BLOCK_ENGINE_URL") {
            self.bundle.block_engine_urls = v.split(',').map(|s| s.trim().to_string()).collect();
        }
    }

    pub fn pool_id(&self) -> EngineResult<Pubkey> {
        parse_pubkey("pool.pool_id", &self.pool.pool_id)
    }

    pub fn token_mint(&self) -> EngineResult<Pubkey> {
        parse_pubkey("pool.token_mint", &self.pool.token_mint)
    }

    pub fn clmm_programs(&self) -> EngineResult<Vec<Pubkey>> {
        self.pool
            .clmm_programs
            .iter()
            .map(|p| parse_pubkey("pool.clmm_programs", p))
            .collect()
    }

    /// Validate ranges and limits before a session starts
    pub fn validate(&self) -> EngineResult<()> {
        self.pool_id()?;
        self.token_mint()?;
        if self.clmm_programs()?.is_empty() {
            return Err(EngineError::config("pool.clmm_programs must not be empty"));
        }

        let t = &self.trading;
        check_range("trading buy quantity", t.min_buy_quantity, t.max_buy_quantity)?;
        check_range("trading sell quantity", t.min_sell_quantity, t.max_sell_quantity)?;
        if t.min_buy_quantity <= 0.0 || t.min_sell_quantity <= 0.0 {
            return Err(EngineError::config("trade quantities must be positive"));
        }
        if !(0.0..1.0).contains(&t.slippage) {
            return Err(EngineError::config(format!(
                "slippage {} out of range [0, 1)",
                t.slippage
            )));
        }

        let s = &self.session;
        check_range("session lifetime", s.min_lifetime_secs, s.max_lifetime_secs)?;
        check_range("session wait", s.min_wait_ms, s.max_wait_ms)?;
        if s.max_lifetime_secs == 0 {
            return Err(EngineError::config("session lifetime must be positive"));
        }

        let b = &self.bundle;
        if b.max_bundle_size == 0 || b.max_bundle_size > MAX_SWAPS_PER_BUNDLE {
            return Err(EngineError::config(format!(
                "max_bundle_size {} out of valid range (1-{})",
                b.max_bundle_size, MAX_SWAPS_PER_BUNDLE
            )));
        }
        if b.block_engine_urls.is_empty() {
            return Err(EngineError::config("bundle.block_engine_urls must not be empty"));
        }

        if self.wallets.number_of_wallets == 0 {
            return Err(EngineError::config("wallets.number_of_wallets must be positive"));
        }
        Ok(())
    }
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parse_pubkey(field: &str, value: &str) -> EngineResult<Pubkey> {
    Pubkey::from_str(value)
        .map_err(|e| EngineError::config(format!("{} '{}' is not a valid address: {}", field, value, e)))
}

fn check_range<T: PartialOrd + std::fmt::Display>(name: &str, min: T, max: T) -> EngineResult<()> {
    if min > max {
        return Err(EngineError::config(format!(
            "{} range inverted: min {} > max {}",
            name, min, max
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn sample_config() -> Config {
    Config {
        rpc: RpcConfig {
            endpoint: "http://localhost:8899".to_string(),
            timeout_secs: default_rpc_timeout(),
            max_retries: default_max_retries(),
        },
        pool: PoolConfig {
            pool_id: Pubkey::new_unique().to_string(),
            token_mint: Pubkey::new_unique().to_string(),
            clmm_programs: default_clmm_programs(),
            api_base: default_pool_api(),
            trade_api_base: default_trade_api(),
            context_max_age_secs: None,
        },
        trading: TradingConfig {
            mode: TradeMode::Mixed,
            min_buy_quantity: 10.0,
            max_buy_quantity: 20.0,
            min_sell_quantity: 5.0,
            max_sell_quantity: 15.0,
            slippage: default_slippage(),
            buffer_lamports: default_buffer_lamports(),
            min_lamports: default_min_lamports(),
            compute_unit_price_micro_lamports: default_compute_unit_price(),
        },
        session: SessionConfig {
            min_lifetime_secs: 60,
            max_lifetime_secs: 120,
            min_wait_ms: 1_000,
            max_wait_ms: 5_000,
        },
        bundle: BundleConfig {
            max_bundle_size: 3,
            tip_lamports: default_tip(),
            block_engine_urls: default_block_engines(),
            fee_payer_keypair_path: "fee_payer.json".to_string(),
            confirm_poll_ms: default_confirm_poll_ms(),
        },
        wallets: WalletsConfig {
            path: "wallets.json".to_string(),
            number_of_wallets: 3,
        },
        monitoring: MonitoringConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sample_config_is_valid() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut inverted = sample_config();
        inverted.trading.min_buy_quantity = 50.0;
        assert!(inverted.validate().is_err());

        let mut slippage = sample_config();
        slippage.trading.slippage = 1.5;
        assert!(slippage.validate().is_err());

        let mut oversized = sample_config();
        oversized.bundle.max_bundle_size = 5;
        assert!(oversized.validate().is_err());

        let mut empty = sample_config();
        empty.bundle.max_bundle_size = 0;
        assert!(empty.validate().is_err());

        let mut bad_pool = sample_config();
        bad_pool.pool.pool_id = "not-a-key".to_string();
        assert!(matches!(
            bad_pool.validate(),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_file_applies_defaults() {
        let toml = r#"
[rpc]
endpoint = "http://localhost:8899"

[pool]
pool_id = "8sLbNZoA1cfnvMJLPfp98ZLAnFSYCFApfJKMbiXNLwxj"
token_mint = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"

[trading]
mode = "buy"
min_buy_quantity = 1.0
max_buy_quantity = 2.0
min_sell_quantity = 1.0
max_sell_quantity = 2.0

[session]
min_lifetime_secs = 10
max_lifetime_secs = 20
min_wait_ms = 100
max_wait_ms = 200

[bundle]
fee_payer_keypair_path = "payer.json"

[wallets]
path = "wallets.json"
number_of_wallets = 4
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.trading.mode, TradeMode::Buy);
        assert_eq!(config.trading.slippage, 0.01);
        assert_eq!(config.trading.min_lamports, 1_500_000);
        assert_eq!(config.bundle.max_bundle_size, MAX_SWAPS_PER_BUNDLE);
        assert_eq!(config.pool.clmm_programs.len(), 2);
        assert!(!config.monitoring.enable_metrics);
        assert!(config.validate().is_ok());
    }
}
