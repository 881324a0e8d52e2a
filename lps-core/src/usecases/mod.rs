//! Use cases called by the watchers.
//!
//! Each use case is a struct holding its ports and implementing
//! [`kanau::processor::Processor`] for its input. Flow use cases fail with
//! [`UseCaseError`], whose recoverability tells the calling watcher whether
//! to keep the quote for the next tick or to drop it.

pub mod cleaner;
pub mod cold_wallet;
pub mod eclipse;
pub mod liquidity;
pub mod pegin;
pub mod pegout;
pub mod penalization;
pub mod watched;

use crate::alerts::AlertError;
use crate::blockchain::{ContractError, RpcError};
use crate::entities::RepositoryError;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

pub use cleaner::{CleanExpiredQuotes, CleanExpiredQuotesUseCase};
pub use cold_wallet::{
    ColdWalletReport, ColdWalletSettings, ColdWalletTransfer, ColdWalletTransferUseCase,
    TransferOutcome,
};
pub use eclipse::{
    EclipseCheck, EclipseCheckOutcome, EclipseCheckSettings, EclipseCheckUseCase, success_rate,
};
pub use liquidity::{CheckLiquidity, CheckLiquidityUseCase, LiquidityOutcome, LiquidityReport};
pub use pegin::{
    CallForUserUseCase, ExpiredPeginQuoteUseCase, RegisterPeginUseCase, UpdatePeginDeposit,
    UpdatePeginDepositUseCase,
};
pub use pegout::{
    BridgePegout, BridgePegoutOutcome, BridgePegoutUseCase, BtcRelease, BtcReleaseUseCase,
    ExpiredPegoutQuoteUseCase, InitPegoutDepositCache, InitPegoutDepositCacheUseCase,
    RefundPegoutUseCase, SendPegoutUseCase, UpdatePegoutDeposit, UpdatePegoutDepositUseCase,
};
pub use penalization::{PenalizationAlert, PenalizationAlertUseCase};
pub use watched::{
    GetWatchedPeginQuotesUseCase, GetWatchedPegoutQuotesUseCase, WatchedPeginQuotesQuery,
    WatchedPegoutQuotesQuery,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseCaseId {
    GetWatchedPeginQuotes,
    GetWatchedPegoutQuotes,
    UpdatePeginDeposit,
    CallForUser,
    RegisterPegin,
    ExpiredPeginQuote,
    UpdatePegoutDeposit,
    SendPegout,
    RefundPegout,
    BridgePegout,
    ExpiredPegoutQuote,
    InitPegoutDepositCache,
    BtcRelease,
    PenalizationAlert,
    CleanExpiredQuotes,
    EclipseCheck,
}

impl fmt::Display for UseCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UseCaseId::GetWatchedPeginQuotes => "GetWatchedPeginQuotes",
            UseCaseId::GetWatchedPegoutQuotes => "GetWatchedPegoutQuotes",
            UseCaseId::UpdatePeginDeposit => "UpdatePeginDeposit",
            UseCaseId::CallForUser => "CallForUser",
            UseCaseId::RegisterPegin => "RegisterPegin",
            UseCaseId::ExpiredPeginQuote => "ExpiredPeginQuote",
            UseCaseId::UpdatePegoutDeposit => "UpdatePegoutDeposit",
            UseCaseId::SendPegout => "SendPegout",
            UseCaseId::RefundPegout => "RefundPegout",
            UseCaseId::BridgePegout => "BridgePegout",
            UseCaseId::ExpiredPegoutQuote => "ExpiredPegoutQuote",
            UseCaseId::InitPegoutDepositCache => "InitPegoutDepositCache",
            UseCaseId::BtcRelease => "BtcRelease",
            UseCaseId::PenalizationAlert => "PenalizationAlert",
            UseCaseId::CleanExpiredQuotes => "CleanExpiredQuotes",
            UseCaseId::EclipseCheck => "EclipseCheck",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recoverability {
    /// Transient. The quote stays watched and is retried on the next tick.
    Recoverable,
    /// The quote can never succeed and is dropped by the watcher.
    NonRecoverable,
}

#[derive(Debug, Error)]
pub enum UseCaseErrorKind {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error("quote {0} not found")]
    QuoteNotFound(String),

    #[error("quote {quote_hash} is in illegal state {state}")]
    IllegalState { quote_hash: String, state: String },

    #[error("quote {quote_hash} has no {what}")]
    MissingData {
        quote_hash: String,
        what: &'static str,
    },

    #[error("insufficient amount: expected {expected}, received {received}")]
    InsufficientAmount { expected: Decimal, received: Decimal },

    #[error("not enough confirmations: {actual}/{required}")]
    NotEnoughConfirmations { required: u64, actual: u64 },

    #[error("not enough liquidity: need {required}, have {available}")]
    NoLiquidity {
        required: Decimal,
        available: Decimal,
    },

    #[error("transaction {0} failed on chain")]
    TransactionFailed(String),
}

/// Error of a flow use case, tagged with where it happened and whether the
/// quote is worth retrying.
#[derive(Debug, Error)]
#[error("{use_case}: {kind}")]
pub struct UseCaseError {
    pub use_case: UseCaseId,
    pub recoverability: Recoverability,
    pub kind: UseCaseErrorKind,
}

impl UseCaseError {
    pub fn recoverable(use_case: UseCaseId, kind: impl Into<UseCaseErrorKind>) -> Self {
        Self {
            use_case,
            recoverability: Recoverability::Recoverable,
            kind: kind.into(),
        }
    }

    pub fn non_recoverable(use_case: UseCaseId, kind: impl Into<UseCaseErrorKind>) -> Self {
        Self {
            use_case,
            recoverability: Recoverability::NonRecoverable,
            kind: kind.into(),
        }
    }

    /// Transport failures are retried, anything the contract itself refused is not.
    pub fn from_contract(use_case: UseCaseId, error: ContractError) -> Self {
        if error.is_transient() {
            Self::recoverable(use_case, error)
        } else {
            Self::non_recoverable(use_case, error)
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverability == Recoverability::Recoverable
    }
}
