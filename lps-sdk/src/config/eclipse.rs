//! Eclipse detection settings, one block per chain.

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EclipseConfig {
    #[serde(default)]
    pub bitcoin: EclipseTargetConfig,
    #[serde(default)]
    pub rootstock: EclipseTargetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EclipseTargetConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Minimum percentage of external sources that must agree with the node.
    #[serde(default = "default_tolerance_threshold")]
    pub tolerance_threshold: u8,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    /// Checks on this chain are suspended this long after a detection.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Esplora base URLs for bitcoin, JSON-RPC endpoints for rootstock.
    #[serde(default)]
    pub sources: Vec<Url>,
}

impl Default for EclipseTargetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tolerance_threshold: default_tolerance_threshold(),
            max_wait_secs: default_max_wait_secs(),
            retry_interval_secs: default_retry_interval_secs(),
            cooldown_secs: default_cooldown_secs(),
            sources: Vec::new(),
        }
    }
}

fn default_tolerance_threshold() -> u8 {
    100
}

fn default_max_wait_secs() -> u64 {
    600
}

fn default_retry_interval_secs() -> u64 {
    30
}

fn default_cooldown_secs() -> u64 {
    3600
}
