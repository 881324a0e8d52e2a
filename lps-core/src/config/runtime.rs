//! Validated settings handed to the application bootstrap.

use lps_sdk::config::{
    AlertConfig, BitcoinConfig, ColdWalletConfig, EclipseConfig, LiquidityConfig, PegoutConfig,
    RootstockConfig, WatcherIntervals,
};
use std::time::Duration;

/// Tick period of every watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherSchedule {
    pub pegin_deposit: Duration,
    pub pegin_bridge: Duration,
    pub pegout_rsk_deposit: Duration,
    pub pegout_btc_transfer: Duration,
    pub pegout_bridge: Duration,
    pub btc_release: Duration,
    pub penalization: Duration,
    pub liquidity_check: Duration,
    pub cold_wallet: Duration,
    pub quote_cleaner: Duration,
    pub eclipse_check: Duration,
}

impl From<&WatcherIntervals> for WatcherSchedule {
    fn from(intervals: &WatcherIntervals) -> Self {
        Self {
            pegin_deposit: Duration::from_secs(intervals.pegin_deposit_secs),
            pegin_bridge: Duration::from_secs(intervals.pegin_bridge_secs),
            pegout_rsk_deposit: Duration::from_secs(intervals.pegout_rsk_deposit_secs),
            pegout_btc_transfer: Duration::from_secs(intervals.pegout_btc_transfer_secs),
            pegout_bridge: Duration::from_secs(intervals.pegout_bridge_secs),
            btc_release: Duration::from_secs(intervals.btc_release_secs),
            penalization: Duration::from_secs(intervals.penalization_secs),
            liquidity_check: Duration::from_secs(intervals.liquidity_check_secs),
            cold_wallet: Duration::from_secs(intervals.cold_wallet_secs),
            quote_cleaner: Duration::from_secs(intervals.quote_cleaner_secs),
            eclipse_check: Duration::from_secs(intervals.eclipse_check_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bitcoin: BitcoinConfig,
    pub rootstock: RootstockConfig,
    pub alerts: AlertConfig,
    pub schedule: WatcherSchedule,
    pub pegout: PegoutConfig,
    pub liquidity: LiquidityConfig,
    pub liquidity_timeout: Duration,
    pub cold_wallet: Option<ColdWalletConfig>,
    pub cold_wallet_timeout: Duration,
    pub eclipse: EclipseConfig,
}
