//! Quote objects shared between the API layer and the watcher engine.

pub mod pegin;
pub mod pegout;
pub mod units;

use serde::{Deserialize, Serialize};

pub use pegin::{PeginDepositCheck, PeginQuote, PeginState, RetainedPeginQuote};
pub use pegout::{PegoutDeposit, PegoutQuote, PegoutState, RetainedPegoutQuote};
pub use units::{WEI_PER_SATOSHI, satoshi_to_wei, wei_to_satoshi};

/// Chain whose node is being looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Bitcoin,
    Rootstock,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::Bitcoin => write!(f, "bitcoin"),
            NodeType::Rootstock => write!(f, "rootstock"),
        }
    }
}

/// Metadata captured when the quote was accepted.
///
/// Older quotes may not have it, which is why watchers treat it as optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteCreationData {
    pub gas_price: rust_decimal::Decimal,
    pub fee_percentage: rust_decimal::Decimal,
    pub fixed_fee: rust_decimal::Decimal,
    /// Rootstock height at the moment the quote was accepted.
    #[serde(default)]
    pub creation_block: Option<u64>,
}

/// Error returned when a state string read from storage is unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown quote state: {0}")]
pub struct UnknownState(pub String);
