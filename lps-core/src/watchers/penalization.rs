//! Alerts the operators when the liquidity bridge penalizes this provider.

use super::{StopSignal, Ticker, Watcher, WatcherError};
use crate::blockchain::RskRpc;
use crate::usecases::{PenalizationAlert, PenalizationAlertUseCase};
use crate::utils::block_range::next_range;
use async_trait::async_trait;
use kanau::processor::Processor;
use std::sync::Arc;
use tracing::{error, info};

const NAME: &str = "PenalizationAlertWatcher";
const PAGE_SIZE: u64 = 1000;

pub struct PenalizationWatcher {
    penalization_alert: PenalizationAlertUseCase,
    rsk_rpc: Arc<dyn RskRpc>,
    ticker: Box<dyn Ticker>,
    last_scanned: u64,
}

impl PenalizationWatcher {
    pub fn new(
        penalization_alert: PenalizationAlertUseCase,
        rsk_rpc: Arc<dyn RskRpc>,
        ticker: Box<dyn Ticker>,
    ) -> Self {
        Self {
            penalization_alert,
            rsk_rpc,
            ticker,
            last_scanned: 0,
        }
    }

    pub fn last_scanned(&self) -> u64 {
        self.last_scanned
    }

    pub(crate) async fn on_tick(&mut self) {
        let height = match self.rsk_rpc.get_height().await {
            Ok(height) => height,
            Err(e) => {
                error!(watcher = NAME, error = %e, "Failed to get rootstock height");
                return;
            }
        };

        while let Some((from_block, to_block)) = next_range(self.last_scanned, height, PAGE_SIZE) {
            match self
                .penalization_alert
                .process(PenalizationAlert {
                    from_block,
                    to_block,
                })
                .await
            {
                Ok(0) => {}
                Ok(alerts) => {
                    info!(watcher = NAME, from_block, to_block, alerts, "Penalization alerts sent");
                }
                Err(e) => {
                    error!(watcher = NAME, from_block, to_block, error = %e, "Failed to check penalizations");
                    return;
                }
            }
            self.last_scanned = to_block;
        }
    }
}

#[async_trait]
impl Watcher for PenalizationWatcher {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn prepare(&mut self) -> Result<(), WatcherError> {
        self.last_scanned = self.rsk_rpc.get_height().await?;
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
