//! Configuration file schema for the liquidity provider server.
//!
//! These structs map one to one onto `lps-config.toml`. Validation and the
//! conversion into runtime settings live in the engine crate.

mod chains;
mod eclipse;
mod watchers;

pub use chains::{AlertConfig, BitcoinConfig, RootstockConfig};
pub use eclipse::{EclipseConfig, EclipseTargetConfig};
pub use watchers::{ColdWalletConfig, LiquidityConfig, PegoutConfig, WatcherIntervals};

use serde::{Deserialize, Serialize};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub bitcoin: BitcoinConfig,
    pub rootstock: RootstockConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub watchers: WatcherIntervals,
    #[serde(default)]
    pub pegout: PegoutConfig,
    #[serde(default)]
    pub liquidity: LiquidityConfig,
    #[serde(default)]
    pub cold_wallet: Option<ColdWalletConfig>,
    #[serde(default)]
    pub eclipse: EclipseConfig,
}
