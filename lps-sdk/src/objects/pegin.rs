//! Peg-in objects: the user locks BTC and the provider advances RBTC.

use super::UnknownState;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Terms agreed with the user when the peg-in quote was issued.
///
/// Never mutated after creation. All amounts are in wei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeginQuote {
    pub fed_btc_address: String,
    pub lbc_address: String,
    pub lp_rsk_address: String,
    pub btc_refund_address: String,
    pub rsk_refund_address: String,
    pub lp_btc_address: String,
    pub call_fee: Decimal,
    pub penalty_fee: Decimal,
    pub contract_address: String,
    pub data: String,
    pub gas_limit: u32,
    pub nonce: i64,
    pub value: Decimal,
    /// Unix seconds.
    pub agreement_timestamp: u64,
    /// Seconds the user has to send the deposit.
    pub time_for_deposit: u32,
    pub lp_call_time: u32,
    pub confirmations: u32,
    pub call_on_register: bool,
    pub gas_fee: Decimal,
    #[serde(default)]
    pub product_fee_amount: Decimal,
}

impl PeginQuote {
    /// Everything the user owes: value plus every fee.
    pub fn total(&self) -> Decimal {
        self.value + self.call_fee + self.product_fee_amount + self.gas_fee
    }

    pub fn expire_time(&self) -> u64 {
        self.agreement_timestamp
            .saturating_add(u64::from(self.time_for_deposit))
    }

    pub fn is_expired_at(&self, unix_seconds: u64) -> bool {
        unix_seconds > self.expire_time()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeginState {
    WaitingForDeposit,
    WaitingForDepositConfirmations,
    TimeForDepositElapsed,
    CallForUserSucceeded,
    CallForUserFailed,
    RegisterPegInSucceeded,
    RegisterPegInFailed,
}

impl PeginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeginState::WaitingForDeposit => "WaitingForDeposit",
            PeginState::WaitingForDepositConfirmations => "WaitingForDepositConfirmations",
            PeginState::TimeForDepositElapsed => "TimeForDepositElapsed",
            PeginState::CallForUserSucceeded => "CallForUserSucceeded",
            PeginState::CallForUserFailed => "CallForUserFailed",
            PeginState::RegisterPegInSucceeded => "RegisterPegInSucceeded",
            PeginState::RegisterPegInFailed => "RegisterPegInFailed",
        }
    }
}

impl std::fmt::Display for PeginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeginState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WaitingForDeposit" => Ok(PeginState::WaitingForDeposit),
            "WaitingForDepositConfirmations" => Ok(PeginState::WaitingForDepositConfirmations),
            "TimeForDepositElapsed" => Ok(PeginState::TimeForDepositElapsed),
            "CallForUserSucceeded" => Ok(PeginState::CallForUserSucceeded),
            "CallForUserFailed" => Ok(PeginState::CallForUserFailed),
            "RegisterPegInSucceeded" => Ok(PeginState::RegisterPegInSucceeded),
            "RegisterPegInFailed" => Ok(PeginState::RegisterPegInFailed),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Mutable tracking record for one peg-in quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetainedPeginQuote {
    pub quote_hash: String,
    pub deposit_address: String,
    pub signature: String,
    pub required_liquidity: Decimal,
    pub state: PeginState,
    #[serde(default)]
    pub user_btc_tx_hash: Option<String>,
    #[serde(default)]
    pub call_for_user_tx_hash: Option<String>,
    #[serde(default)]
    pub register_pegin_tx_hash: Option<String>,
}

/// Inputs of the deposit acceptance rule.
///
/// A BTC deposit is accepted only when every condition holds; see
/// [`PeginDepositCheck::accepts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeginDepositCheck {
    pub confirmations: u64,
    pub required_confirmations: u64,
    pub state: PeginState,
    /// Whether the quote had already expired when the deposit was mined.
    pub expired: bool,
    /// Amount received on the deposit address, converted to wei.
    pub amount: Decimal,
    pub total_owed: Decimal,
}

impl PeginDepositCheck {
    pub fn accepts(&self) -> bool {
        self.confirmations >= self.required_confirmations
            && self.state == PeginState::WaitingForDeposit
            && !self.expired
            && self.amount >= self.total_owed
    }
}
