//! Peg-out flow: RSK deposit, BTC payout, refund, bridge return and release.

use super::{UseCaseError, UseCaseErrorKind, UseCaseId};
use crate::blockchain::{
    BitcoinRpc, BitcoinWallet, BridgeContract, LiquidityBridgeContract, RefundPegoutParams,
    RskRpc, RskWallet, WalletSigner,
};
use crate::entities::{PegoutQuoteRepository, WatchedPegoutQuote};
use crate::events::{Event, EventBus};
use crate::utils::block_range::block_pages;
use bitcoin::hex::FromHex;
use kanau::processor::Processor;
use lps_sdk::objects::{PegoutDeposit, PegoutState, RetainedPegoutQuote, wei_to_satoshi};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn illegal_state(use_case: UseCaseId, watched: &WatchedPegoutQuote) -> UseCaseError {
    UseCaseError::non_recoverable(
        use_case,
        UseCaseErrorKind::IllegalState {
            quote_hash: watched.quote_hash().to_string(),
            state: watched.retained.state.to_string(),
        },
    )
}

fn missing(use_case: UseCaseId, watched: &WatchedPegoutQuote, what: &'static str) -> UseCaseError {
    UseCaseError::non_recoverable(
        use_case,
        UseCaseErrorKind::MissingData {
            quote_hash: watched.quote_hash().to_string(),
            what,
        },
    )
}

/// OP_RETURN payload that ties the payout to its quote.
fn op_return_payload(quote_hash: &str) -> Vec<u8> {
    let stripped = quote_hash.strip_prefix("0x").unwrap_or(quote_hash);
    Vec::<u8>::from_hex(stripped).unwrap_or_else(|_| quote_hash.as_bytes().to_vec())
}

#[derive(Debug, Clone)]
pub struct UpdatePegoutDeposit {
    pub watched: WatchedPegoutQuote,
    pub deposit: PegoutDeposit,
}

/// Records a valid RSK deposit and moves the quote to
/// `WaitingForDepositConfirmations`.
pub struct UpdatePegoutDepositUseCase {
    repository: Arc<dyn PegoutQuoteRepository>,
    event_bus: Arc<EventBus>,
}

impl UpdatePegoutDepositUseCase {
    pub fn new(repository: Arc<dyn PegoutQuoteRepository>, event_bus: Arc<EventBus>) -> Self {
        Self {
            repository,
            event_bus,
        }
    }
}

impl Processor<UpdatePegoutDeposit> for UpdatePegoutDepositUseCase {
    type Output = WatchedPegoutQuote;
    type Error = UseCaseError;

    async fn process(&self, input: UpdatePegoutDeposit) -> Result<WatchedPegoutQuote, UseCaseError> {
        const ID: UseCaseId = UseCaseId::UpdatePegoutDeposit;
        let UpdatePegoutDeposit { mut watched, deposit } = input;
        if watched.retained.state != PegoutState::WaitingForDeposit {
            return Err(illegal_state(ID, &watched));
        }
        // The quote keeps waiting: a later deposit may still cover it.
        if !deposit.is_valid_for_quote(&watched.quote) {
            return Err(UseCaseError::recoverable(
                ID,
                UseCaseErrorKind::InsufficientAmount {
                    expected: watched.quote.total(),
                    received: deposit.amount,
                },
            ));
        }

        self.repository
            .upsert_pegout_deposit(&deposit)
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;
        watched.retained.state = PegoutState::WaitingForDepositConfirmations;
        watched.retained.user_rsk_tx_hash = Some(deposit.tx_hash.clone());
        self.repository
            .update_retained_quote(&watched.retained)
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;

        self.event_bus.publish(Event::PegoutDepositConfirmed {
            watched: watched.clone(),
            deposit,
        });
        Ok(watched)
    }
}

/// Pays the quoted BTC to the user once the RSK deposit is deep enough.
pub struct SendPegoutUseCase {
    repository: Arc<dyn PegoutQuoteRepository>,
    rsk_rpc: Arc<dyn RskRpc>,
    btc_wallet: Arc<dyn BitcoinWallet>,
    btc_signer: WalletSigner,
    event_bus: Arc<EventBus>,
}

impl SendPegoutUseCase {
    pub fn new(
        repository: Arc<dyn PegoutQuoteRepository>,
        rsk_rpc: Arc<dyn RskRpc>,
        btc_wallet: Arc<dyn BitcoinWallet>,
        btc_signer: WalletSigner,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            repository,
            rsk_rpc,
            btc_wallet,
            btc_signer,
            event_bus,
        }
    }

    async fn finish(
        &self,
        watched: &WatchedPegoutQuote,
        error: Option<String>,
    ) -> Result<(), UseCaseError> {
        self.repository
            .update_retained_quote(&watched.retained)
            .await
            .map_err(|e| UseCaseError::non_recoverable(UseCaseId::SendPegout, e))?;
        self.event_bus.publish(Event::PegoutBtcSentToUser {
            watched: watched.clone(),
            error,
        });
        Ok(())
    }
}

impl Processor<WatchedPegoutQuote> for SendPegoutUseCase {
    type Output = WatchedPegoutQuote;
    type Error = UseCaseError;

    async fn process(&self, watched: WatchedPegoutQuote) -> Result<WatchedPegoutQuote, UseCaseError> {
        const ID: UseCaseId = UseCaseId::SendPegout;
        let mut watched = watched;
        if watched.retained.state != PegoutState::WaitingForDepositConfirmations {
            return Err(illegal_state(ID, &watched));
        }
        let deposit_tx = watched
            .retained
            .user_rsk_tx_hash
            .clone()
            .ok_or_else(|| missing(ID, &watched, "user RSK transaction"))?;

        let Some(receipt) = self
            .rsk_rpc
            .get_transaction_receipt(&deposit_tx)
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?
        else {
            return Err(UseCaseError::recoverable(
                ID,
                UseCaseErrorKind::MissingData {
                    quote_hash: watched.quote_hash().to_string(),
                    what: "deposit receipt",
                },
            ));
        };
        if !receipt.succeeded {
            watched.retained.state = PegoutState::SendPegoutFailed;
            let kind = UseCaseErrorKind::TransactionFailed(receipt.tx_hash);
            self.finish(&watched, Some(kind.to_string())).await?;
            return Err(UseCaseError::non_recoverable(ID, kind));
        }

        let height = self
            .rsk_rpc
            .get_height()
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;
        let confirmations = height.saturating_sub(receipt.block_number);
        let required = u64::from(watched.quote.deposit_confirmations);
        if confirmations < required {
            return Err(UseCaseError::recoverable(
                ID,
                UseCaseErrorKind::NotEnoughConfirmations {
                    required,
                    actual: confirmations,
                },
            ));
        }

        let satoshis = wei_to_satoshi(watched.quote.value)
            .ok_or_else(|| missing(ID, &watched, "payable value"))?;
        let available = self
            .btc_wallet
            .balance()
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;
        if available < satoshis {
            return Err(UseCaseError::recoverable(
                ID,
                UseCaseErrorKind::NoLiquidity {
                    required: Decimal::from(satoshis),
                    available: Decimal::from(available),
                },
            ));
        }

        let payload = op_return_payload(watched.quote_hash());
        let result = {
            let permit = self.btc_signer.acquire().await;
            self.btc_wallet
                .send_with_op_return(&permit, &watched.quote.deposit_address, satoshis, &payload)
                .await
        };

        match result {
            Ok(tx_hash) => {
                info!(
                    quote_hash = %watched.quote_hash(),
                    tx_hash = %tx_hash,
                    satoshis,
                    "BTC sent to peg-out user"
                );
                watched.retained.state = PegoutState::SendPegoutSucceeded;
                watched.retained.lp_btc_tx_hash = Some(tx_hash);
                self.finish(&watched, None).await?;
                Ok(watched)
            }
            Err(e) => {
                watched.retained.state = PegoutState::SendPegoutFailed;
                self.finish(&watched, Some(e.to_string())).await?;
                Err(UseCaseError::non_recoverable(ID, e))
            }
        }
    }
}

/// Proves the BTC payout to the liquidity bridge contract to get refunded.
pub struct RefundPegoutUseCase {
    repository: Arc<dyn PegoutQuoteRepository>,
    contract: Arc<dyn LiquidityBridgeContract>,
    bitcoin_rpc: Arc<dyn BitcoinRpc>,
    rsk_signer: WalletSigner,
    event_bus: Arc<EventBus>,
}

impl RefundPegoutUseCase {
    pub fn new(
        repository: Arc<dyn PegoutQuoteRepository>,
        contract: Arc<dyn LiquidityBridgeContract>,
        bitcoin_rpc: Arc<dyn BitcoinRpc>,
        rsk_signer: WalletSigner,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            repository,
            contract,
            bitcoin_rpc,
            rsk_signer,
            event_bus,
        }
    }

    async fn finish(
        &self,
        watched: &WatchedPegoutQuote,
        error: Option<String>,
    ) -> Result<(), UseCaseError> {
        self.repository
            .update_retained_quote(&watched.retained)
            .await
            .map_err(|e| UseCaseError::non_recoverable(UseCaseId::RefundPegout, e))?;
        self.event_bus.publish(Event::PegoutRefunded {
            watched: watched.clone(),
            error,
        });
        Ok(())
    }
}

impl Processor<WatchedPegoutQuote> for RefundPegoutUseCase {
    type Output = WatchedPegoutQuote;
    type Error = UseCaseError;

    async fn process(&self, watched: WatchedPegoutQuote) -> Result<WatchedPegoutQuote, UseCaseError> {
        const ID: UseCaseId = UseCaseId::RefundPegout;
        let mut watched = watched;
        if watched.retained.state != PegoutState::SendPegoutSucceeded {
            return Err(illegal_state(ID, &watched));
        }
        let tx_hash = watched
            .retained
            .lp_btc_tx_hash
            .clone()
            .ok_or_else(|| missing(ID, &watched, "provider BTC transaction"))?;

        let recoverable = |e| UseCaseError::recoverable(ID, UseCaseErrorKind::Rpc(e));
        let tx = self
            .bitcoin_rpc
            .get_transaction_info(&tx_hash)
            .await
            .map_err(recoverable)?;
        let required = u64::from(watched.quote.transfer_confirmations);
        if tx.confirmations < required {
            return Err(UseCaseError::recoverable(
                ID,
                UseCaseErrorKind::NotEnoughConfirmations {
                    required,
                    actual: tx.confirmations,
                },
            ));
        }

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
        let merkle_branch = self
            .bitcoin_rpc
            .get_merkle_branch(&tx_hash)
            .await
            .map_err(recoverable)?;

        let params = RefundPegoutParams {
            quote_hash: watched.quote_hash().to_string(),
            raw_btc_tx,
            btc_block_hash: block.hash,
            partial_merkle_tree,
            merkle_branch,
        };

        let result = {
            let permit = self.rsk_signer.acquire().await;
            self.contract.refund_pegout(&permit, &params).await
        };

        match result {
            Err(e) if e.is_transient() => Err(UseCaseError::recoverable(ID, e)),
            Err(e) => {
                watched.retained.state = PegoutState::RefundPegOutFailed;
                self.finish(&watched, Some(e.to_string())).await?;
                Err(UseCaseError::non_recoverable(ID, e))
            }
            Ok(receipt) if !receipt.succeeded => {
                watched.retained.state = PegoutState::RefundPegOutFailed;
                watched.retained.refund_pegout_tx_hash = Some(receipt.tx_hash.clone());
                let kind = UseCaseErrorKind::TransactionFailed(receipt.tx_hash);
                self.finish(&watched, Some(kind.to_string())).await?;
                Err(UseCaseError::non_recoverable(ID, kind))
            }
            Ok(receipt) => {
                info!(
                    quote_hash = %watched.quote_hash(),
                    tx_hash = %receipt.tx_hash,
                    "Peg-out refunded"
                );
                watched.retained.state = PegoutState::RefundPegOutSucceeded;
                watched.retained.refund_pegout_tx_hash = Some(receipt.tx_hash);
                self.finish(&watched, None).await?;
                Ok(watched)
            }
        }
    }
}

/// Returns refunded peg-out value to the bridge in a single transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgePegout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgePegoutOutcome {
    NothingToSubmit,
    BelowMinimum {
        total: Decimal,
        minimum: Decimal,
    },
    Submitted {
        tx_hash: String,
        quote_hashes: Vec<String>,
        total: Decimal,
    },
}

pub struct BridgePegoutUseCase {
    repository: Arc<dyn PegoutQuoteRepository>,
    bridge: Arc<dyn BridgeContract>,
    rsk_wallet: Arc<dyn RskWallet>,
    rsk_signer: WalletSigner,
}

impl BridgePegoutUseCase {
    pub fn new(
        repository: Arc<dyn PegoutQuoteRepository>,
        bridge: Arc<dyn BridgeContract>,
        rsk_wallet: Arc<dyn RskWallet>,
        rsk_signer: WalletSigner,
    ) -> Self {
        Self {
            repository,
            bridge,
            rsk_wallet,
            rsk_signer,
        }
    }

    async fn mark_all(
        &self,
        quotes: &mut [RetainedPegoutQuote],
        state: PegoutState,
        tx_hash: Option<&str>,
    ) -> Result<(), UseCaseError> {
        for retained in quotes.iter_mut() {
            retained.state = state;
            retained.bridge_refund_tx_hash = tx_hash.map(str::to_string);
            self.repository
                .update_retained_quote(retained)
                .await
                .map_err(|e| UseCaseError::non_recoverable(UseCaseId::BridgePegout, e))?;
        }
        Ok(())
    }
}

impl Processor<BridgePegout> for BridgePegoutUseCase {
    type Output = BridgePegoutOutcome;
    type Error = UseCaseError;

    async fn process(&self, _: BridgePegout) -> Result<BridgePegoutOutcome, UseCaseError> {
        const ID: UseCaseId = UseCaseId::BridgePegout;
        let candidates = self
            .repository
            .get_retained_quotes_by_state(&[PegoutState::RefundPegOutSucceeded])
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;

        let mut quotes = Vec::with_capacity(candidates.len());
        let mut total = Decimal::ZERO;
        for retained in candidates {
            match self
                .repository
                .get_quote(&retained.quote_hash)
                .await
                .map_err(|e| UseCaseError::recoverable(ID, e))?
            {
                Some(quote) => {
                    total += quote.value;
                    quotes.push(retained);
                }
                None => {
                    warn!(quote_hash = %retained.quote_hash, "Refunded peg-out without agreement, skipping");
                }
            }
        }
        if quotes.is_empty() {
            return Ok(BridgePegoutOutcome::NothingToSubmit);
        }

        let minimum = self
            .bridge
            .minimum_pegout_amount()
            .await
            .map_err(|e| UseCaseError::from_contract(ID, e))?;
        if total < minimum {
            return Ok(BridgePegoutOutcome::BelowMinimum { total, minimum });
        }

        let available = self
            .rsk_wallet
            .balance()
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;
        if available < total {
            return Err(UseCaseError::recoverable(
                ID,
                UseCaseErrorKind::NoLiquidity {
                    required: total,
                    available,
                },
            ));
        }

        let bridge_address = self.bridge.address();
        let result = {
            let permit = self.rsk_signer.acquire().await;
            self.rsk_wallet
                .send_value(&permit, &bridge_address, total)
                .await
        };

        match result {
            Ok(receipt) if receipt.succeeded => {
                self.mark_all(&mut quotes, PegoutState::BridgeTxSucceeded, Some(&receipt.tx_hash))
                    .await?;
                let quote_hashes = quotes.into_iter().map(|q| q.quote_hash).collect();
                Ok(BridgePegoutOutcome::Submitted {
                    tx_hash: receipt.tx_hash,
                    quote_hashes,
                    total,
                })
            }
            Ok(receipt) => {
                self.mark_all(&mut quotes, PegoutState::BridgeTxFailed, Some(&receipt.tx_hash))
                    .await?;
                Err(UseCaseError::non_recoverable(
                    ID,
                    UseCaseErrorKind::TransactionFailed(receipt.tx_hash),
                ))
            }
            Err(e) => {
                self.mark_all(&mut quotes, PegoutState::BridgeTxFailed, None)
                    .await?;
                Err(UseCaseError::non_recoverable(ID, e))
            }
        }
    }
}

/// Marks a peg-out quote whose deposit window elapsed.
pub struct ExpiredPegoutQuoteUseCase {
    repository: Arc<dyn PegoutQuoteRepository>,
}

impl ExpiredPegoutQuoteUseCase {
    pub fn new(repository: Arc<dyn PegoutQuoteRepository>) -> Self {
        Self { repository }
    }
}

impl Processor<WatchedPegoutQuote> for ExpiredPegoutQuoteUseCase {
    type Output = WatchedPegoutQuote;
    type Error = UseCaseError;

    async fn process(&self, watched: WatchedPegoutQuote) -> Result<WatchedPegoutQuote, UseCaseError> {
        const ID: UseCaseId = UseCaseId::ExpiredPegoutQuote;
        let mut watched = watched;
        if watched.retained.state != PegoutState::WaitingForDeposit {
            return Err(illegal_state(ID, &watched));
        }
        watched.retained.state = PegoutState::TimeForDepositElapsed;
        self.repository
            .update_retained_quote(&watched.retained)
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;
        Ok(watched)
    }
}

/// Bulk-loads deposit events from `from_block` to `to_block`, both inclusive.
#[derive(Debug, Clone, Copy)]
pub struct InitPegoutDepositCache {
    pub from_block: u64,
    pub to_block: u64,
    pub page_size: u64,
}

pub struct InitPegoutDepositCacheUseCase {
    contract: Arc<dyn LiquidityBridgeContract>,
    repository: Arc<dyn PegoutQuoteRepository>,
}

impl InitPegoutDepositCacheUseCase {
    pub fn new(
        contract: Arc<dyn LiquidityBridgeContract>,
        repository: Arc<dyn PegoutQuoteRepository>,
    ) -> Self {
        Self {
            contract,
            repository,
        }
    }
}

impl Processor<InitPegoutDepositCache> for InitPegoutDepositCacheUseCase {
    type Output = u64;
    type Error = UseCaseError;

    async fn process(&self, input: InitPegoutDepositCache) -> Result<u64, UseCaseError> {
        const ID: UseCaseId = UseCaseId::InitPegoutDepositCache;
        let mut cached = 0;
        for (from, to) in block_pages(input.from_block, input.to_block, input.page_size) {
            let deposits = self
                .contract
                .get_pegout_deposits(from, to)
                .await
                .map_err(|e| UseCaseError::from_contract(ID, e))?;
            if deposits.is_empty() {
                continue;
            }
            cached += self
                .repository
                .upsert_pegout_deposits(&deposits)
                .await
                .map_err(|e| UseCaseError::recoverable(ID, e))?;
            debug!(from, to, count = deposits.len(), "Cached peg-out deposits");
        }
        Ok(cached)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BtcRelease {
    pub from_block: u64,
    pub to_block: u64,
}

/// Matches bridge batch releases with the refunds that fed them.
pub struct BtcReleaseUseCase {
    repository: Arc<dyn PegoutQuoteRepository>,
    bridge: Arc<dyn BridgeContract>,
}

impl BtcReleaseUseCase {
    pub fn new(repository: Arc<dyn PegoutQuoteRepository>, bridge: Arc<dyn BridgeContract>) -> Self {
        Self { repository, bridge }
    }
}

impl Processor<BtcRelease> for BtcReleaseUseCase {
    /// Hashes of the quotes marked as released.
    type Output = Vec<String>;
    type Error = UseCaseError;

    async fn process(&self, input: BtcRelease) -> Result<Vec<String>, UseCaseError> {
        const ID: UseCaseId = UseCaseId::BtcRelease;
        let events = self
            .bridge
            .get_batch_pegout_created_events(input.from_block, input.to_block)
            .await
            .map_err(|e| UseCaseError::from_contract(ID, e))?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let pending = self
            .repository
            .get_retained_quotes_by_state(&[PegoutState::BridgeTxSucceeded])
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;
        let mut by_refund_tx: HashMap<String, Vec<RetainedPegoutQuote>> = HashMap::new();
        for retained in pending {
            if let Some(tx_hash) = &retained.bridge_refund_tx_hash {
                by_refund_tx
                    .entry(tx_hash.to_lowercase())
                    .or_default()
                    .push(retained);
            }
        }

        let mut released = Vec::new();
        for event in events {
            for rsk_tx in &event.release_rsk_tx_hashes {
                let Some(quotes) = by_refund_tx.remove(&rsk_tx.to_lowercase()) else {
                    continue;
                };
                for mut retained in quotes {
                    retained.state = PegoutState::BtcReleased;
                    retained.btc_release_tx_hash = Some(event.btc_tx_hash.clone());
                    self.repository
                        .update_retained_quote(&retained)
                        .await
                        .map_err(|e| UseCaseError::recoverable(ID, e))?;
                    info!(
                        quote_hash = %retained.quote_hash,
                        btc_tx_hash = %event.btc_tx_hash,
                        "Peg-out released by the bridge"
                    );
                    released.push(retained.quote_hash);
                }
            }
        }
        Ok(released)
    }
}
