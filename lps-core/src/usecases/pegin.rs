//! Peg-in flow: deposit acceptance, call for user, bridge registration and expiry.

use super::{UseCaseError, UseCaseErrorKind, UseCaseId};
use crate::blockchain::{
    BitcoinRpc, LiquidityBridgeContract, RegisterPeginParams, RskWallet, WalletSigner,
};
use crate::entities::{PeginQuoteRepository, WatchedPeginQuote};
use crate::events::{Event, EventBus};
use kanau::processor::Processor;
use lps_sdk::objects::{PeginState, satoshi_to_wei};
use std::sync::Arc;
use tracing::{info, warn};

fn illegal_state(use_case: UseCaseId, watched: &WatchedPeginQuote) -> UseCaseError {
    UseCaseError::non_recoverable(
        use_case,
        UseCaseErrorKind::IllegalState {
            quote_hash: watched.quote_hash().to_string(),
            state: watched.retained.state.to_string(),
        },
    )
}

fn missing(use_case: UseCaseId, watched: &WatchedPeginQuote, what: &'static str) -> UseCaseError {
    UseCaseError::non_recoverable(
        use_case,
        UseCaseErrorKind::MissingData {
            quote_hash: watched.quote_hash().to_string(),
            what,
        },
    )
}

#[derive(Debug, Clone)]
pub struct UpdatePeginDeposit {
    pub watched: WatchedPeginQuote,
    pub tx_hash: String,
}

/// Records an accepted BTC deposit and moves the quote to
/// `WaitingForDepositConfirmations`.
pub struct UpdatePeginDepositUseCase {
    repository: Arc<dyn PeginQuoteRepository>,
}

impl UpdatePeginDepositUseCase {
    pub fn new(repository: Arc<dyn PeginQuoteRepository>) -> Self {
        Self { repository }
    }
}

impl Processor<UpdatePeginDeposit> for UpdatePeginDepositUseCase {
    type Output = WatchedPeginQuote;
    type Error = UseCaseError;

    async fn process(&self, input: UpdatePeginDeposit) -> Result<WatchedPeginQuote, UseCaseError> {
        const ID: UseCaseId = UseCaseId::UpdatePeginDeposit;
        let mut watched = input.watched;
        if watched.retained.state != PeginState::WaitingForDeposit {
            return Err(illegal_state(ID, &watched));
        }

        watched.retained.state = PeginState::WaitingForDepositConfirmations;
        watched.retained.user_btc_tx_hash = Some(input.tx_hash);
        self.repository
            .update_retained_quote(&watched.retained)
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;
        Ok(watched)
    }
}

/// Advances the quote value to the user's destination on Rootstock.
pub struct CallForUserUseCase {
    repository: Arc<dyn PeginQuoteRepository>,
    contract: Arc<dyn LiquidityBridgeContract>,
    bitcoin_rpc: Arc<dyn BitcoinRpc>,
    rsk_wallet: Arc<dyn RskWallet>,
    signer: WalletSigner,
    event_bus: Arc<EventBus>,
}

impl CallForUserUseCase {
    pub fn new(
        repository: Arc<dyn PeginQuoteRepository>,
        contract: Arc<dyn LiquidityBridgeContract>,
        bitcoin_rpc: Arc<dyn BitcoinRpc>,
        rsk_wallet: Arc<dyn RskWallet>,
        signer: WalletSigner,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            repository,
            contract,
            bitcoin_rpc,
            rsk_wallet,
            signer,
            event_bus,
        }
    }

    /// Persists the terminal state and notifies subscribers.
    ///
    /// A persistence failure here is non-recoverable: the contract call has
    /// already been made and must not be repeated.
    async fn finish(
        &self,
        watched: &WatchedPeginQuote,
        error: Option<String>,
    ) -> Result<(), UseCaseError> {
        self.repository
            .update_retained_quote(&watched.retained)
            .await
            .map_err(|e| UseCaseError::non_recoverable(UseCaseId::CallForUser, e))?;
        self.event_bus.publish(Event::CallForUserCompleted {
            watched: watched.clone(),
            error,
        });
        Ok(())
    }
}

impl Processor<WatchedPeginQuote> for CallForUserUseCase {
    type Output = WatchedPeginQuote;
    type Error = UseCaseError;

    async fn process(&self, watched: WatchedPeginQuote) -> Result<WatchedPeginQuote, UseCaseError> {
        const ID: UseCaseId = UseCaseId::CallForUser;
        let mut watched = watched;
        if watched.retained.state != PeginState::WaitingForDepositConfirmations {
            return Err(illegal_state(ID, &watched));
        }
        let tx_hash = watched
            .retained
            .user_btc_tx_hash
            .clone()
            .ok_or_else(|| missing(ID, &watched, "user BTC transaction"))?;

        let tx = self
            .bitcoin_rpc
            .get_transaction_info(&tx_hash)
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;
        let required = u64::from(watched.quote.confirmations);
        if tx.confirmations < required {
            return Err(UseCaseError::recoverable(
                ID,
                UseCaseErrorKind::NotEnoughConfirmations {
                    required,
                    actual: tx.confirmations,
                },
            ));
        }

        let received = satoshi_to_wei(tx.amount_to(&watched.retained.deposit_address));
        let expected = watched.quote.total();
        if received < expected {
            watched.retained.state = PeginState::CallForUserFailed;
            let kind = UseCaseErrorKind::InsufficientAmount { expected, received };
            self.finish(&watched, Some(kind.to_string())).await?;
            return Err(UseCaseError::non_recoverable(ID, kind));
        }

        let available = self
            .rsk_wallet
            .balance()
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;
        if available < watched.quote.value {
            return Err(UseCaseError::recoverable(
                ID,
                UseCaseErrorKind::NoLiquidity {
                    required: watched.quote.value,
                    available,
                },
            ));
        }

        let result = {
            let permit = self.signer.acquire().await;
            self.contract.call_for_user(&permit, &watched.quote).await
        };

        match result {
            Err(e) if e.is_transient() => Err(UseCaseError::recoverable(ID, e)),
            Err(e) => {
                watched.retained.state = PeginState::CallForUserFailed;
                self.finish(&watched, Some(e.to_string())).await?;
                Err(UseCaseError::non_recoverable(ID, e))
            }
            Ok(receipt) if !receipt.succeeded => {
                watched.retained.state = PeginState::CallForUserFailed;
                watched.retained.call_for_user_tx_hash = Some(receipt.tx_hash.clone());
                let kind = UseCaseErrorKind::TransactionFailed(receipt.tx_hash);
                self.finish(&watched, Some(kind.to_string())).await?;
                Err(UseCaseError::non_recoverable(ID, kind))
            }
            Ok(receipt) => {
                info!(
                    quote_hash = %watched.quote_hash(),
                    tx_hash = %receipt.tx_hash,
                    "Call for user succeeded"
                );
                watched.retained.state = PeginState::CallForUserSucceeded;
                watched.retained.call_for_user_tx_hash = Some(receipt.tx_hash);
                self.finish(&watched, None).await?;
                Ok(watched)
            }
        }
    }
}

/// Registers the user's BTC deposit on the bridge so the provider gets refunded.
pub struct RegisterPeginUseCase {
    repository: Arc<dyn PeginQuoteRepository>,
    contract: Arc<dyn LiquidityBridgeContract>,
    bitcoin_rpc: Arc<dyn BitcoinRpc>,
    signer: WalletSigner,
    event_bus: Arc<EventBus>,
}

impl RegisterPeginUseCase {
    pub fn new(
        repository: Arc<dyn PeginQuoteRepository>,
        contract: Arc<dyn LiquidityBridgeContract>,
        bitcoin_rpc: Arc<dyn BitcoinRpc>,
        signer: WalletSigner,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            repository,
            contract,
            bitcoin_rpc,
            signer,
            event_bus,
        }
    }

    async fn finish(
        &self,
        watched: &WatchedPeginQuote,
        error: Option<String>,
    ) -> Result<(), UseCaseError> {
        self.repository
            .update_retained_quote(&watched.retained)
            .await
            .map_err(|e| UseCaseError::non_recoverable(UseCaseId::RegisterPegin, e))?;
        self.event_bus.publish(Event::RegisterPeginCompleted {
            watched: watched.clone(),
            error,
        });
        Ok(())
    }
}

impl Processor<WatchedPeginQuote> for RegisterPeginUseCase {
    type Output = WatchedPeginQuote;
    type Error = UseCaseError;

    async fn process(&self, watched: WatchedPeginQuote) -> Result<WatchedPeginQuote, UseCaseError> {
        const ID: UseCaseId = UseCaseId::RegisterPegin;
        let mut watched = watched;
        if watched.retained.state != PeginState::CallForUserSucceeded {
            return Err(illegal_state(ID, &watched));
        }
        let tx_hash = watched
            .retained
            .user_btc_tx_hash
            .clone()
            .ok_or_else(|| missing(ID, &watched, "user BTC transaction"))?;

        let recoverable = |e| UseCaseError::recoverable(ID, UseCaseErrorKind::Rpc(e));
        let block = self
            .bitcoin_rpc
            .get_transaction_block_info(&tx_hash)
            .await
            .map_err(recoverable)?;
        let raw_btc_tx = self
            .bitcoin_rpc
            .get_raw_transaction(&tx_hash)
            .await
            .map_err(recoverable)?;
        let partial_merkle_tree = self
            .bitcoin_rpc
            .get_partial_merkle_tree(&tx_hash)
            .await
            .map_err(recoverable)?;

        let params = RegisterPeginParams {
            quote: watched.quote.clone(),
            signature: watched.retained.signature.clone(),
            raw_btc_tx,
            partial_merkle_tree,
            block_height: block.height,
        };

        let result = {
            let permit = self.signer.acquire().await;
            self.contract.register_pegin(&permit, &params).await
        };

        match result {
            Err(e) if e.is_transient() => Err(UseCaseError::recoverable(ID, e)),
            Err(e) => {
                watched.retained.state = PeginState::RegisterPegInFailed;
                self.finish(&watched, Some(e.to_string())).await?;
                Err(UseCaseError::non_recoverable(ID, e))
            }
            Ok(receipt) if !receipt.succeeded => {
                watched.retained.state = PeginState::RegisterPegInFailed;
                watched.retained.register_pegin_tx_hash = Some(receipt.tx_hash.clone());
                let kind = UseCaseErrorKind::TransactionFailed(receipt.tx_hash);
                self.finish(&watched, Some(kind.to_string())).await?;
                Err(UseCaseError::non_recoverable(ID, kind))
            }
            Ok(receipt) => {
                info!(
                    quote_hash = %watched.quote_hash(),
                    tx_hash = %receipt.tx_hash,
                    "Peg-in registered on the bridge"
                );
                watched.retained.state = PeginState::RegisterPegInSucceeded;
                watched.retained.register_pegin_tx_hash = Some(receipt.tx_hash);
                self.finish(&watched, None).await?;
                Ok(watched)
            }
        }
    }
}

/// Marks a quote whose deposit window elapsed without a valid deposit.
pub struct ExpiredPeginQuoteUseCase {
    repository: Arc<dyn PeginQuoteRepository>,
}

impl ExpiredPeginQuoteUseCase {
    pub fn new(repository: Arc<dyn PeginQuoteRepository>) -> Self {
        Self { repository }
    }
}

impl Processor<WatchedPeginQuote> for ExpiredPeginQuoteUseCase {
    type Output = WatchedPeginQuote;
    type Error = UseCaseError;

    async fn process(&self, watched: WatchedPeginQuote) -> Result<WatchedPeginQuote, UseCaseError> {
        const ID: UseCaseId = UseCaseId::ExpiredPeginQuote;
        let mut watched = watched;
        if watched.retained.state != PeginState::WaitingForDeposit {
            warn!(
                quote_hash = %watched.quote_hash(),
                state = %watched.retained.state,
                "Refusing to expire peg-in quote"
            );
            return Err(illegal_state(ID, &watched));
        }
        watched.retained.state = PeginState::TimeForDepositElapsed;
        self.repository
            .update_retained_quote(&watched.retained)
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;
        Ok(watched)
    }
}
