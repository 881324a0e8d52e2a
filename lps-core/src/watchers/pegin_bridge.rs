//! Registers paid peg-ins on the bridge once their BTC deposit is deep enough.

use super::{
    BlockHeight, StopSignal, Ticker, Watcher, WatcherError, WorkingSet, WorkingSetReader,
};
use crate::blockchain::{BitcoinRpc, BridgeContract};
use crate::entities::{PeginQuoteRepository, WatchedPeginQuote};
use crate::events::{Event, EventBus, EventId, EventReceiver};
use crate::usecases::{GetWatchedPeginQuotesUseCase, RegisterPeginUseCase, WatchedPeginQuotesQuery};
use async_trait::async_trait;
use kanau::processor::Processor;
use lps_sdk::objects::PeginState;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const NAME: &str = "PeginBridgeWatcher";

pub struct PeginBridgeWatcher {
    get_watched: GetWatchedPeginQuotesUseCase,
    register_pegin: RegisterPeginUseCase,
    bitcoin_rpc: Arc<dyn BitcoinRpc>,
    bridge: Arc<dyn BridgeContract>,
    events: EventReceiver,
    ticker: Box<dyn Ticker>,
    quotes: WorkingSet<WatchedPeginQuote>,
    height: BlockHeight,
    required_confirmations: u64,
}

impl PeginBridgeWatcher {
    pub fn new(
        repository: Arc<dyn PeginQuoteRepository>,
        register_pegin: RegisterPeginUseCase,
        bitcoin_rpc: Arc<dyn BitcoinRpc>,
        bridge: Arc<dyn BridgeContract>,
        event_bus: &EventBus,
        ticker: Box<dyn Ticker>,
    ) -> Self {
        Self {
            get_watched: GetWatchedPeginQuotesUseCase::new(repository),
            register_pegin,
            bitcoin_rpc,
            bridge,
            events: event_bus.subscribe(EventId::CallForUserCompleted),
            ticker,
            quotes: WorkingSet::new(),
            height: BlockHeight::new(),
            required_confirmations: 0,
        }
    }

    pub fn reader(&self) -> WorkingSetReader<WatchedPeginQuote> {
        self.quotes.reader()
    }

    pub(crate) fn handle_event(&mut self, event: Event) {
        let id = event.id();
        let Event::CallForUserCompleted { watched, .. } = event else {
            warn!(watcher = NAME, event = %id, "Unexpected event, discarding");
            return;
        };
        if watched.retained.state != PeginState::CallForUserSucceeded {
            return;
        }
        let quote_hash = watched.quote_hash().to_string();
        if self.quotes.contains(&quote_hash) {
            info!(quote_hash = %quote_hash, "Peg-in quote already watched");
            return;
        }
        info!(quote_hash = %quote_hash, "Waiting to register peg-in");
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
            let Some(tx_hash) = watched.retained.user_btc_tx_hash.as_deref() else {
                error!(quote_hash = %quote_hash, "Peg-in quote has no deposit transaction, dropping");
                self.quotes.remove(&quote_hash);
                continue;
            };
            let confirmations = match self.bitcoin_rpc.get_transaction_info(tx_hash).await {
                Ok(tx) => tx.confirmations,
                Err(e) => {
                    error!(quote_hash = %quote_hash, error = %e, "Failed to get deposit transaction");
                    continue;
                }
            };
            if confirmations < self.required_confirmations {
                debug!(
                    quote_hash = %quote_hash,
                    confirmations,
                    required = self.required_confirmations,
                    "Deposit not deep enough for the bridge"
                );
                continue;
            }

            match self.register_pegin.process(watched).await {
                Ok(_) => {
                    self.quotes.remove(&quote_hash);
                }
                Err(e) if e.is_recoverable() => {
                    warn!(quote_hash = %quote_hash, error = %e, "Register peg-in failed, retrying next block");
                }
                Err(e) => {
                    error!(quote_hash = %quote_hash, error = %e, "Register peg-in failed");
                    self.quotes.remove(&quote_hash);
                }
            }
        }
    }
}

#[async_trait]
impl Watcher for PeginBridgeWatcher {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn prepare(&mut self) -> Result<(), WatcherError> {
        self.required_confirmations = self.bridge.required_tx_confirmations().await?;
        let quotes = self
            .get_watched
            .process(WatchedPeginQuotesQuery {
                states: vec![PeginState::CallForUserSucceeded],
            })
            .await?;
        for watched in quotes {
            self.quotes.insert(watched.quote_hash().to_string(), watched);
        }
        info!(
            watcher = NAME,
            quotes = self.quotes.len(),
            required_confirmations = self.required_confirmations,
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
