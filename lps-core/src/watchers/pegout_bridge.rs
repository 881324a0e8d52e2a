//! Periodically returns refunded peg-out value to the bridge.

use super::{StopSignal, Ticker, Watcher, WatcherError};
use crate::usecases::{BridgePegout, BridgePegoutOutcome, BridgePegoutUseCase};
use async_trait::async_trait;
use kanau::processor::Processor;
use tracing::{debug, error, info, warn};

const NAME: &str = "PegoutBridgeWatcher";

pub struct PegoutBridgeWatcher {
    bridge_pegout: BridgePegoutUseCase,
    ticker: Box<dyn Ticker>,
}

impl PegoutBridgeWatcher {
    pub fn new(bridge_pegout: BridgePegoutUseCase, ticker: Box<dyn Ticker>) -> Self {
        Self {
            bridge_pegout,
            ticker,
        }
    }

    pub(crate) async fn on_tick(&mut self) {
        match self.bridge_pegout.process(BridgePegout).await {
            Ok(BridgePegoutOutcome::NothingToSubmit) => {
                debug!(watcher = NAME, "No refunded peg-outs to return");
            }
            Ok(BridgePegoutOutcome::BelowMinimum { total, minimum }) => {
                info!(
                    watcher = NAME,
                    total = %total,
                    minimum = %minimum,
                    "Refunded peg-outs below the bridge minimum, waiting for more"
                );
            }
            Ok(BridgePegoutOutcome::Submitted {
                tx_hash,
                quote_hashes,
                total,
            }) => {
                info!(
                    watcher = NAME,
                    tx_hash = %tx_hash,
                    total = %total,
                    quotes = ?quote_hashes,
                    "Peg-out value returned to the bridge"
                );
            }
            Err(e) if e.is_recoverable() => {
                warn!(watcher = NAME, error = %e, "Bridge peg-out postponed");
            }
            Err(e) => {
                error!(watcher = NAME, error = %e, "Bridge peg-out failed");
            }
        }
    }
}

#[async_trait]
impl Watcher for PegoutBridgeWatcher {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn prepare(&mut self) -> Result<(), WatcherError> {
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
                _ = self.ticker.tick() => self.on_tick().await,
            }
        }
    }
}
