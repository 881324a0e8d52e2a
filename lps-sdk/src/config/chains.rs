//! Node connection and alerting sections.

use serde::{Deserialize, Serialize};
use url::Url;

/// Bitcoin Core JSON-RPC connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinConfig {
    pub rpc_url: Url,
    pub rpc_user: String,
    pub rpc_password: String,
    /// Wallet used for payouts and watch-only deposit addresses.
    #[serde(default)]
    pub wallet: Option<String>,
}

/// Rootstock JSON-RPC connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootstockConfig {
    pub rpc_url: Url,
    /// Provider account, unlocked on the node.
    pub lp_address: String,
}

/// Operator alerting.
///
/// Without a webhook the alerts only reach the logs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub webhook_url: Option<Url>,
    #[serde(default)]
    pub recipients: Vec<String>,
}
