//! Watches the liquidity bridge contract for peg-out deposits.
//!
//! Deposits are read from `current_block` up to the Rootstock tip on every
//! new block. A valid deposit moves its quote to
//! `WaitingForDepositConfirmations`; once the deposit receipt is
//! `deposit_confirmations` deep the BTC is sent to the user. Quotes whose
//! deposit window elapsed, by time or by block, are expired.

use super::{
    BlockHeight, Clock, StopSignal, Ticker, Watcher, WatcherError, WorkingSet, WorkingSetReader,
    unix_now,
};
use crate::blockchain::{LiquidityBridgeContract, RskRpc};
use crate::entities::{PegoutQuoteRepository, WatchedPegoutQuote};
use crate::events::{Event, EventBus, EventId, EventReceiver};
use crate::usecases::{
    ExpiredPegoutQuoteUseCase, GetWatchedPegoutQuotesUseCase, InitPegoutDepositCache,
    InitPegoutDepositCacheUseCase, SendPegoutUseCase, UpdatePegoutDeposit,
    UpdatePegoutDepositUseCase, WatchedPegoutQuotesQuery,
};
use async_trait::async_trait;
use kanau::processor::Processor;
use lps_sdk::objects::{PegoutDeposit, PegoutState};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const NAME: &str = "PegoutRskDepositWatcher";

/// Startup bulk load of deposit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositCacheSettings {
    /// Loading is skipped when unset.
    pub start_block: Option<u64>,
    pub page_size: u64,
}

pub struct PegoutRskDepositWatcher {
    get_watched: GetWatchedPegoutQuotesUseCase,
    update_deposit: UpdatePegoutDepositUseCase,
    send_pegout: SendPegoutUseCase,
    expire: ExpiredPegoutQuoteUseCase,
    init_cache: InitPegoutDepositCacheUseCase,
    contract: Arc<dyn LiquidityBridgeContract>,
    rsk_rpc: Arc<dyn RskRpc>,
    events: EventReceiver,
    ticker: Box<dyn Ticker>,
    quotes: WorkingSet<WatchedPegoutQuote>,
    height: BlockHeight,
    current_block: u64,
    cache: DepositCacheSettings,
    clock: Clock,
}

impl PegoutRskDepositWatcher {
    pub fn new(
        repository: Arc<dyn PegoutQuoteRepository>,
        send_pegout: SendPegoutUseCase,
        contract: Arc<dyn LiquidityBridgeContract>,
        rsk_rpc: Arc<dyn RskRpc>,
        event_bus: &Arc<EventBus>,
        cache: DepositCacheSettings,
        ticker: Box<dyn Ticker>,
    ) -> Self {
        Self {
            get_watched: GetWatchedPegoutQuotesUseCase::new(repository.clone()),
            update_deposit: UpdatePegoutDepositUseCase::new(repository.clone(), event_bus.clone()),
            send_pegout,
            expire: ExpiredPegoutQuoteUseCase::new(repository.clone()),
            init_cache: InitPegoutDepositCacheUseCase::new(contract.clone(), repository),
            contract,
            rsk_rpc,
            events: event_bus.subscribe(EventId::AcceptedPegoutQuote),
            ticker,
            quotes: WorkingSet::new(),
            height: BlockHeight::new(),
            current_block: 0,
            cache,
            clock: unix_now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn reader(&self) -> WorkingSetReader<WatchedPegoutQuote> {
        self.quotes.reader()
    }

    /// First block of the next deposit query.
    pub fn current_block(&self) -> u64 {
        self.current_block
    }

    pub(crate) fn handle_event(&mut self, event: Event) {
        let id = event.id();
        let Event::AcceptedPegoutQuote { watched } = event else {
            warn!(watcher = NAME, event = %id, "Unexpected event, discarding");
            return;
        };
        let quote_hash = watched.quote_hash().to_string();
        if self.quotes.contains(&quote_hash) {
            info!(quote_hash = %quote_hash, "Peg-out quote already watched");
            return;
        }
        info!(quote_hash = %quote_hash, "Watching peg-out deposit");
        self.quotes.insert(quote_hash, watched);
    }

    pub(crate) async fn on_tick(&mut self) {
        let height = match self.rsk_rpc.get_height().await {
            Ok(height) => height,
            Err(e) => {
                error!(watcher = NAME, error = %e, "Failed to get rootstock height");
                return;
            }
        };
        if !self.height.advance(height) {
            return;
        }

        match self
            .contract
            .get_pegout_deposits(self.current_block, height)
            .await
        {
            Ok(deposits) => {
                debug!(
                    watcher = NAME,
                    from = self.current_block,
                    to = height,
                    count = deposits.len(),
                    "Read peg-out deposits"
                );
                for deposit in deposits {
                    self.handle_deposit(deposit).await;
                }
                self.current_block = height;
            }
            Err(e) => {
                error!(
                    watcher = NAME,
                    from = self.current_block,
                    to = height,
                    error = %e,
                    "Failed to read peg-out deposits"
                );
                // Unread deposits may belong to quotes that look expired.
                return;
            }
        }

        let now = (self.clock)();
        for watched in self.quotes.snapshot() {
            match watched.retained.state {
                PegoutState::WaitingForDeposit => {
                    let expired = watched.quote.is_expired_at(now)
                        || height > watched.quote.expire_block;
                    if expired {
                        self.expire_quote(watched).await;
                    }
                }
                PegoutState::WaitingForDepositConfirmations => {
                    self.check_confirmations(watched, height).await
                }
                state => {
                    warn!(quote_hash = %watched.quote_hash(), state = %state, "Dropping peg-out quote in unexpected state");
                    self.quotes.remove(watched.quote_hash());
                }
            }
        }
    }

    async fn handle_deposit(&mut self, deposit: PegoutDeposit) {
        let Some(watched) = self.quotes.get(&deposit.quote_hash) else {
            return;
        };
        if watched.retained.state != PegoutState::WaitingForDeposit {
            return;
        }
        let quote_hash = deposit.quote_hash.clone();
        if !deposit.is_valid_for_quote(&watched.quote) {
            warn!(
                quote_hash = %quote_hash,
                tx_hash = %deposit.tx_hash,
                amount = %deposit.amount,
                expected = %watched.quote.total(),
                "Peg-out deposit does not satisfy the quote"
            );
            return;
        }

        let tx_hash = deposit.tx_hash.clone();
        match self
            .update_deposit
            .process(UpdatePegoutDeposit { watched, deposit })
            .await
        {
            Ok(updated) => {
                info!(quote_hash = %quote_hash, tx_hash = %tx_hash, "Peg-out deposit accepted");
                self.quotes.insert(quote_hash, updated);
            }
            Err(e) if e.is_recoverable() => {
                warn!(quote_hash = %quote_hash, error = %e, "Failed to record peg-out deposit");
            }
            Err(e) => {
                error!(quote_hash = %quote_hash, error = %e, "Failed to record peg-out deposit");
                self.quotes.remove(&quote_hash);
            }
        }
    }

    async fn check_confirmations(&mut self, watched: WatchedPegoutQuote, height: u64) {
        let quote_hash = watched.quote_hash().to_string();
        let Some(tx_hash) = watched.retained.user_rsk_tx_hash.as_deref() else {
            error!(quote_hash = %quote_hash, "Peg-out quote has no deposit transaction, dropping");
            self.quotes.remove(&quote_hash);
            return;
        };
        let receipt = match self.rsk_rpc.get_transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                debug!(quote_hash = %quote_hash, tx_hash, "Deposit receipt not available yet");
                return;
            }
            Err(e) => {
                error!(quote_hash = %quote_hash, error = %e, "Failed to get deposit receipt");
                return;
            }
        };
        // A failed receipt is settled by the use case.
        let confirmations = height.saturating_sub(receipt.block_number);
        if receipt.succeeded && confirmations < u64::from(watched.quote.deposit_confirmations) {
            return;
        }

        match self.send_pegout.process(watched).await {
            Ok(_) => {
                self.quotes.remove(&quote_hash);
            }
            Err(e) if e.is_recoverable() => {
                warn!(quote_hash = %quote_hash, error = %e, "Send peg-out failed, retrying next block");
            }
            Err(e) => {
                error!(quote_hash = %quote_hash, error = %e, "Send peg-out failed");
                self.quotes.remove(&quote_hash);
            }
        }
    }

    async fn expire_quote(&mut self, watched: WatchedPegoutQuote) {
        let quote_hash = watched.quote_hash().to_string();
        match self.expire.process(watched).await {
            Ok(_) => {
                info!(quote_hash = %quote_hash, "Peg-out quote expired without deposit");
                self.quotes.remove(&quote_hash);
            }
            Err(e) if e.is_recoverable() => {
                warn!(quote_hash = %quote_hash, error = %e, "Failed to expire peg-out quote");
            }
            Err(e) => {
                error!(quote_hash = %quote_hash, error = %e, "Failed to expire peg-out quote");
                self.quotes.remove(&quote_hash);
            }
        }
    }
}

#[async_trait]
impl Watcher for PegoutRskDepositWatcher {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn prepare(&mut self) -> Result<(), WatcherError> {
        let quotes = self
            .get_watched
            .process(WatchedPegoutQuotesQuery {
                states: vec![
                    PegoutState::WaitingForDeposit,
                    PegoutState::WaitingForDepositConfirmations,
                ],
            })
            .await?;
        let tip = self.rsk_rpc.get_height().await?;

        let oldest_creation = quotes.iter().filter_map(|q| q.creation_block()).min();
        self.current_block = [self.cache.start_block, oldest_creation]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(tip);
        for watched in quotes {
            self.quotes.insert(watched.quote_hash().to_string(), watched);
        }

        if let Some(from_block) = self.cache.start_block {
            let cached = self
                .init_cache
                .process(InitPegoutDepositCache {
                    from_block,
                    to_block: tip,
                    page_size: self.cache.page_size,
                })
                .await?;
            info!(watcher = NAME, from_block, to_block = tip, cached, "Peg-out deposit cache loaded");
        }

        info!(
            watcher = NAME,
            quotes = self.quotes.len(),
            current_block = self.current_block,
            "Working set loaded"
        );
        Ok(())
    }

    async fn start(&mut self, mut stop: StopSignal) {
        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => {
                    self.ticker.stop();
                    break;
                }
                Some(event) = self.events.recv() => self.handle_event(event),
                _ = self.ticker.tick() => self.on_tick().await,
            }
        }
    }
}
