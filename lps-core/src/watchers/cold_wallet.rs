//! Periodic sweep of excess hot-wallet liquidity to cold storage.

use super::{StopSignal, Ticker, Watcher, WatcherError};
use crate::usecases::{ColdWalletReport, ColdWalletTransfer, ColdWalletTransferUseCase};
use async_trait::async_trait;
use kanau::processor::Processor;
use std::time::Duration;
use tracing::error;

const NAME: &str = "ColdWalletWatcher";

pub struct ColdWalletWatcher {
    transfer: ColdWalletTransferUseCase,
    timeout: Duration,
    ticker: Box<dyn Ticker>,
}

impl ColdWalletWatcher {
    pub fn new(
        transfer: ColdWalletTransferUseCase,
        timeout: Duration,
        ticker: Box<dyn Ticker>,
    ) -> Self {
        Self {
            transfer,
            timeout,
            ticker,
        }
    }

    /// A failed or timed out transfer waits for the next tick.
    pub(crate) async fn on_tick(&mut self) -> Option<ColdWalletReport> {
        match tokio::time::timeout(self.timeout, self.transfer.process(ColdWalletTransfer)).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(never)) => match never {},
            Err(_) => {
                error!(watcher = NAME, timeout = ?self.timeout, "Cold wallet transfer timed out");
                None
            }
        }
    }
}

#[async_trait]
impl Watcher for ColdWalletWatcher {
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
                _ = self.ticker.tick() => {
                    self.on_tick().await;
                }
            }
        }
    }
}
