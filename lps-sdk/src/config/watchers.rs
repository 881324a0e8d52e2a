//! Watcher scheduling and the settings of the individual flows.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tick period of every watcher, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherIntervals {
    #[serde(default = "one_minute")]
    pub pegin_deposit_secs: u64,
    #[serde(default = "one_minute")]
    pub pegin_bridge_secs: u64,
    #[serde(default = "ten_seconds")]
    pub pegout_rsk_deposit_secs: u64,
    #[serde(default = "one_minute")]
    pub pegout_btc_transfer_secs: u64,
    #[serde(default = "one_hour")]
    pub pegout_bridge_secs: u64,
    #[serde(default = "one_minute")]
    pub btc_release_secs: u64,
    #[serde(default = "one_minute")]
    pub penalization_secs: u64,
    #[serde(default = "ten_minutes")]
    pub liquidity_check_secs: u64,
    #[serde(default = "one_hour")]
    pub cold_wallet_secs: u64,
    #[serde(default = "one_hour")]
    pub quote_cleaner_secs: u64,
    #[serde(default = "one_minute")]
    pub eclipse_check_secs: u64,
}

impl Default for WatcherIntervals {
    fn default() -> Self {
        Self {
            pegin_deposit_secs: one_minute(),
            pegin_bridge_secs: one_minute(),
            pegout_rsk_deposit_secs: ten_seconds(),
            pegout_btc_transfer_secs: one_minute(),
            pegout_bridge_secs: one_hour(),
            btc_release_secs: one_minute(),
            penalization_secs: one_minute(),
            liquidity_check_secs: ten_minutes(),
            cold_wallet_secs: one_hour(),
            quote_cleaner_secs: one_hour(),
            eclipse_check_secs: one_minute(),
        }
    }
}

fn ten_seconds() -> u64 {
    10
}

fn one_minute() -> u64 {
    60
}

fn ten_minutes() -> u64 {
    600
}

fn one_hour() -> u64 {
    3600
}

/// Peg-out specific settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PegoutConfig {
    /// When set, deposit events are bulk-loaded from this block on startup.
    #[serde(default)]
    pub deposit_cache_start_block: Option<u64>,
    #[serde(default = "default_deposit_cache_page_size")]
    pub deposit_cache_page_size: u64,
    #[serde(default = "default_btc_release_page_size")]
    pub btc_release_page_size: u64,
    /// First block scanned for bridge releases. Defaults to the tip.
    #[serde(default)]
    pub btc_release_start_block: Option<u64>,
}

impl Default for PegoutConfig {
    fn default() -> Self {
        Self {
            deposit_cache_start_block: None,
            deposit_cache_page_size: default_deposit_cache_page_size(),
            btc_release_page_size: default_btc_release_page_size(),
            btc_release_start_block: None,
        }
    }
}

fn default_deposit_cache_page_size() -> u64 {
    1000
}

fn default_btc_release_page_size() -> u64 {
    500
}

/// Balances below these limits raise an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityConfig {
    /// RBTC needed to keep serving peg-ins, in wei.
    #[serde(default)]
    pub min_pegin_liquidity: Decimal,
    /// BTC needed to keep serving peg-outs, in satoshis.
    #[serde(default)]
    pub min_pegout_liquidity: u64,
    #[serde(default = "default_use_case_timeout")]
    pub timeout_secs: u64,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            min_pegin_liquidity: Decimal::ZERO,
            min_pegout_liquidity: 0,
            timeout_secs: default_use_case_timeout(),
        }
    }
}

fn default_use_case_timeout() -> u64 {
    60
}

/// Excess liquidity above the hot-wallet thresholds is moved to cold storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdWalletConfig {
    pub btc_address: String,
    pub rsk_address: String,
    /// Satoshis kept in the hot wallet.
    pub btc_hot_threshold: u64,
    /// Wei kept in the hot wallet.
    pub rsk_hot_threshold: Decimal,
    #[serde(default = "default_btc_min_transfer")]
    pub btc_min_transfer: u64,
    #[serde(default = "default_rsk_min_transfer")]
    pub rsk_min_transfer: Decimal,
    #[serde(default = "default_use_case_timeout")]
    pub timeout_secs: u64,
}

fn default_btc_min_transfer() -> u64 {
    100_000
}

fn default_rsk_min_transfer() -> Decimal {
    // 0.001 RBTC
    Decimal::from(1_000_000_000_000_000i64)
}
