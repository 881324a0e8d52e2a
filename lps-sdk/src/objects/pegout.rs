//! Peg-out objects: the user locks RBTC and the provider pays out BTC.

use super::UnknownState;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Terms agreed with the user when the peg-out quote was issued.
///
/// Amounts are in wei. `deposit_address` is the user's BTC destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PegoutQuote {
    pub lbc_address: String,
    pub lp_rsk_address: String,
    pub btc_refund_address: String,
    pub rsk_refund_address: String,
    pub lp_btc_address: String,
    pub call_fee: Decimal,
    pub penalty_fee: Decimal,
    pub nonce: i64,
    pub deposit_address: String,
    pub value: Decimal,
    pub agreement_timestamp: u64,
    pub deposit_date_limit: u64,
    pub deposit_confirmations: u32,
    pub transfer_confirmations: u32,
    pub transfer_time: u32,
    pub expire_date: u64,
    pub expire_block: u64,
    pub gas_fee: Decimal,
    #[serde(default)]
    pub product_fee_amount: Decimal,
}

impl PegoutQuote {
    pub fn total(&self) -> Decimal {
        self.value + self.call_fee + self.product_fee_amount + self.gas_fee
    }

    pub fn is_expired_at(&self, unix_seconds: u64) -> bool {
        unix_seconds > self.expire_date
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PegoutState {
    WaitingForDeposit,
    WaitingForDepositConfirmations,
    TimeForDepositElapsed,
    SendPegoutSucceeded,
    SendPegoutFailed,
    RefundPegOutSucceeded,
    RefundPegOutFailed,
    BridgeTxSucceeded,
    BridgeTxFailed,
    BtcReleased,
}

impl PegoutState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PegoutState::WaitingForDeposit => "WaitingForDeposit",
            PegoutState::WaitingForDepositConfirmations => "WaitingForDepositConfirmations",
            PegoutState::TimeForDepositElapsed => "TimeForDepositElapsed",
            PegoutState::SendPegoutSucceeded => "SendPegoutSucceeded",
            PegoutState::SendPegoutFailed => "SendPegoutFailed",
            PegoutState::RefundPegOutSucceeded => "RefundPegOutSucceeded",
            PegoutState::RefundPegOutFailed => "RefundPegOutFailed",
            PegoutState::BridgeTxSucceeded => "BridgeTxSucceeded",
            PegoutState::BridgeTxFailed => "BridgeTxFailed",
            PegoutState::BtcReleased => "BtcReleased",
        }
    }
}

impl std::fmt::Display for PegoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PegoutState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WaitingForDeposit" => Ok(PegoutState::WaitingForDeposit),
            "WaitingForDepositConfirmations" => Ok(PegoutState::WaitingForDepositConfirmations),
            "TimeForDepositElapsed" => Ok(PegoutState::TimeForDepositElapsed),
            "SendPegoutSucceeded" => Ok(PegoutState::SendPegoutSucceeded),
            "SendPegoutFailed" => Ok(PegoutState::SendPegoutFailed),
            "RefundPegOutSucceeded" => Ok(PegoutState::RefundPegOutSucceeded),
            "RefundPegOutFailed" => Ok(PegoutState::RefundPegOutFailed),
            "BridgeTxSucceeded" => Ok(PegoutState::BridgeTxSucceeded),
            "BridgeTxFailed" => Ok(PegoutState::BridgeTxFailed),
            "BtcReleased" => Ok(PegoutState::BtcReleased),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Mutable tracking record for one peg-out quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetainedPegoutQuote {
    pub quote_hash: String,
    pub deposit_address: String,
    pub signature: String,
    pub required_liquidity: Decimal,
    pub state: PegoutState,
    #[serde(default)]
    pub user_rsk_tx_hash: Option<String>,
    #[serde(default)]
    pub lp_btc_tx_hash: Option<String>,
    #[serde(default)]
    pub refund_pegout_tx_hash: Option<String>,
    #[serde(default)]
    pub bridge_refund_tx_hash: Option<String>,
    #[serde(default)]
    pub btc_release_tx_hash: Option<String>,
}

/// A deposit observed on the liquidity bridge contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PegoutDeposit {
    pub tx_hash: String,
    pub quote_hash: String,
    /// Wei.
    pub amount: Decimal,
    /// Unix seconds of the block that included the deposit.
    pub timestamp: u64,
    pub block_number: u64,
    pub from: String,
}

impl PegoutDeposit {
    /// A deposit counts only when it covers the whole quote and arrived
    /// before both the time and the block limits.
    pub fn is_valid_for_quote(&self, quote: &PegoutQuote) -> bool {
        let enough_amount = self.amount >= quote.total();
        let in_time = self.timestamp <= quote.expire_date;
        let in_blocks = self.block_number <= quote.expire_block;
        enough_amount && in_time && in_blocks
    }
}
