//! Claims the refund of a peg-out once the BTC payout is confirmed.

use super::{
    BlockHeight, StopSignal, Ticker, Watcher, WatcherError, WorkingSet, WorkingSetReader,
};
use crate::blockchain::BitcoinRpc;
use crate::entities::{PegoutQuoteRepository, WatchedPegoutQuote};
use crate::events::{Event, EventBus, EventId, EventReceiver};
use crate::usecases::{GetWatchedPegoutQuotesUseCase, RefundPegoutUseCase, WatchedPegoutQuotesQuery};
use async_trait::async_trait;
use kanau::processor::Processor;
use lps_sdk::objects::PegoutState;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const NAME: &str = "PegoutBtcTransferWatcher";

pub struct PegoutBtcTransferWatcher {
    get_watched: GetWatchedPegoutQuotesUseCase,
    refund_pegout: RefundPegoutUseCase,
    bitcoin_rpc: Arc<dyn BitcoinRpc>,
    events: EventReceiver,
    ticker: Box<dyn Ticker>,
    quotes: WorkingSet<WatchedPegoutQuote>,
    height: BlockHeight,
}

impl PegoutBtcTransferWatcher {
    pub fn new(
        repository: Arc<dyn PegoutQuoteRepository>,
        refund_pegout: RefundPegoutUseCase,
        bitcoin_rpc: Arc<dyn BitcoinRpc>,
        event_bus: &EventBus,
        ticker: Box<dyn Ticker>,
    ) -> Self {
        Self {
            get_watched: GetWatchedPegoutQuotesUseCase::new(repository),
            refund_pegout,
            bitcoin_rpc,
            events: event_bus.subscribe(EventId::PegoutBtcSentToUser),
            ticker,
            quotes: WorkingSet::new(),
            height: BlockHeight::new(),
        }
    }

    pub fn reader(&self) -> WorkingSetReader<WatchedPegoutQuote> {
        self.quotes.reader()
    }

    pub(crate) fn handle_event(&mut self, event: Event) {
        let id = event.id();
        let Event::PegoutBtcSentToUser { watched, .. } = event else {
            warn!(watcher = NAME, event = %id, "Unexpected event, discarding");
            return;
        };
        if watched.retained.state != PegoutState::SendPegoutSucceeded {
            return;
        }
        let quote_hash = watched.quote_hash().to_string();
        if self.quotes.contains(&quote_hash) {
            info!(quote_hash = %quote_hash, "Peg-out quote already watched");
            return;
        }
        info!(quote_hash = %quote_hash, "Waiting for peg-out BTC confirmations");
        self.quotes.insert(quote_hash, watched);
    }

    pub(crate) async fn on_tick(&mut self) {
        let height = match self.bitcoin_rpc.get_height().await {
            Ok(height) => height,
            Err(e) => {
                error!(watcher = NAME, error = %e, "Failed to get bitcoin height");
                return;
            }
        };
        if !self.height.advance(height) {
            return;
        }

        for watched in self.quotes.snapshot() {
            let quote_hash = watched.quote_hash().to_string();
            let Some(tx_hash) = watched.retained.lp_btc_tx_hash.as_deref() else {
                error!(quote_hash = %quote_hash, "Peg-out quote has no BTC payout, dropping");
                self.quotes.remove(&quote_hash);
                continue;
            };
            let confirmations = match self.bitcoin_rpc.get_transaction_info(tx_hash).await {
                Ok(tx) => tx.confirmations,
                Err(e) => {
                    error!(quote_hash = %quote_hash, error = %e, "Failed to get BTC payout");
                    continue;
                }
            };
            if confirmations < u64::from(watched.quote.transfer_confirmations) {
                debug!(quote_hash = %quote_hash, confirmations, "Payout not confirmed yet");
                continue;
            }

            match self.refund_pegout.process(watched).await {
                Ok(_) => {
                    self.quotes.remove(&quote_hash);
                }
                Err(e) if e.is_recoverable() => {
                    warn!(quote_hash = %quote_hash, error = %e, "Refund peg-out failed, retrying next block");
                }
                Err(e) => {
                    error!(quote_hash = %quote_hash, error = %e, "Refund peg-out failed");
                    self.quotes.remove(&quote_hash);
                }
            }
        }
    }
}

#[async_trait]
impl Watcher for PegoutBtcTransferWatcher {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn prepare(&mut self) -> Result<(), WatcherError> {
        let quotes = self
            .get_watched
            .process(WatchedPegoutQuotesQuery {
                states: vec![PegoutState::SendPegoutSucceeded],
            })
            .await?;
        for watched in quotes {
            self.quotes.insert(watched.quote_hash().to_string(), watched);
        }
        info!(watcher = NAME, quotes = self.quotes.len(), "Working set loaded");
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
