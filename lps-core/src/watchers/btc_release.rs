//! Follows the bridge batch releases that pay out refunded peg-outs.

use super::{StopSignal, Ticker, Watcher, WatcherError};
use crate::blockchain::RskRpc;
use crate::usecases::{BtcRelease, BtcReleaseUseCase};
use async_trait::async_trait;
use kanau::processor::Processor;
use std::sync::Arc;
use tracing::{debug, error, info};

const NAME: &str = "BtcReleaseWatcher";

pub struct BtcReleaseWatcher {
    btc_release: BtcReleaseUseCase,
    rsk_rpc: Arc<dyn RskRpc>,
    ticker: Box<dyn Ticker>,
    start_block: Option<u64>,
    page_size: u64,
    current_block: u64,
}

impl BtcReleaseWatcher {
    pub fn new(
        btc_release: BtcReleaseUseCase,
        rsk_rpc: Arc<dyn RskRpc>,
        start_block: Option<u64>,
        page_size: u64,
        ticker: Box<dyn Ticker>,
    ) -> Self {
        Self {
            btc_release,
            rsk_rpc,
            ticker,
            start_block,
            page_size: page_size.max(1),
            current_block: 0,
        }
    }

    /// First block not scanned yet.
    pub fn current_block(&self) -> u64 {
        self.current_block
    }

    /// Scans `[current, height)` page by page. Stops at the first failed page,
    /// which is retried on the next tick.
    pub(crate) async fn on_tick(&mut self) {
        let height = match self.rsk_rpc.get_height().await {
            Ok(height) => height,
            Err(e) => {
                error!(watcher = NAME, error = %e, "Failed to get rootstock height");
                return;
            }
        };

        while self.current_block < height {
            let end = self
                .current_block
                .saturating_add(self.page_size)
                .min(height);
            let input = BtcRelease {
                from_block: self.current_block,
                to_block: end - 1,
            };
            match self.btc_release.process(input).await {
                Ok(released) => {
                    if released.is_empty() {
                        debug!(watcher = NAME, from = input.from_block, to = input.to_block, "No releases");
                    } else {
                        info!(
                            watcher = NAME,
                            from = input.from_block,
                            to = input.to_block,
                            quotes = ?released,
                            "Peg-outs released"
                        );
                    }
                    self.current_block = end;
                }
                Err(e) => {
                    error!(
                        watcher = NAME,
                        from = input.from_block,
                        to = input.to_block,
                        error = %e,
                        "Failed to process bridge releases"
                    );
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Watcher for BtcReleaseWatcher {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn prepare(&mut self) -> Result<(), WatcherError> {
        self.current_block = match self.start_block {
            Some(block) => block,
            None => self.rsk_rpc.get_height().await?,
        };
        info!(watcher = NAME, current_block = self.current_block, "Release scan position set");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::BatchPegoutCreated;
    use crate::test_utils::{MockBridge, MockPegoutRepository, MockRskRpc, watched_pegout};
    use crate::watchers::ManualTicker;
    use lps_sdk::objects::PegoutState;
    use std::sync::atomic::Ordering;

    struct Fixture {
        repository: Arc<MockPegoutRepository>,
        bridge: Arc<MockBridge>,
        rsk_rpc: Arc<MockRskRpc>,
    }

    impl Fixture {
        fn new() -> Self {
            let rsk_rpc = Arc::new(MockRskRpc::default());
            rsk_rpc.set_height(230);
            Self {
                repository: Arc::new(MockPegoutRepository::default()),
                bridge: Arc::new(MockBridge::default()),
                rsk_rpc,
            }
        }

        fn watcher(&self, start_block: Option<u64>) -> BtcReleaseWatcher {
            let (ticker, _trigger) = ManualTicker::new();
            BtcReleaseWatcher::new(
                BtcReleaseUseCase::new(self.repository.clone(), self.bridge.clone()),
                self.rsk_rpc.clone(),
                start_block,
                50,
                Box::new(ticker),
            )
        }
    }

    #[tokio::test]
    async fn test_start_defaults_to_tip() {
        let fixture = Fixture::new();
        let mut watcher = fixture.watcher(None);

        watcher.prepare().await.unwrap();
        watcher.on_tick().await;

        assert_eq!(watcher.current_block(), 230);
        assert!(fixture.bridge.queried_ranges.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pages_up_to_the_tip_and_marks_releases() {
        let fixture = Fixture::new();
        let mut watched = watched_pegout("pegoutHash1", PegoutState::BridgeTxSucceeded);
        watched.retained.bridge_refund_tx_hash = Some("0xABC1".to_string());
        fixture.repository.insert(&watched);
        fixture.bridge.events.lock().unwrap().push(BatchPegoutCreated {
            btc_tx_hash: "btcRelease1".to_string(),
            release_rsk_tx_hashes: vec!["0xabc1".to_string()],
            block_number: 160,
        });
        let mut watcher = fixture.watcher(Some(100));
        watcher.prepare().await.unwrap();

        watcher.on_tick().await;

        assert_eq!(
            *fixture.bridge.queried_ranges.lock().unwrap(),
            vec![(100, 149), (150, 199), (200, 229)]
        );
        assert_eq!(watcher.current_block(), 230);
        assert_eq!(
            fixture.repository.state_of("pegoutHash1"),
            Some(PegoutState::BtcReleased)
        );
    }

    #[tokio::test]
    async fn test_failed_page_is_retried() {
        let fixture = Fixture::new();
        fixture.bridge.fail_queries.store(true, Ordering::SeqCst);
        let mut watcher = fixture.watcher(Some(200));
        watcher.prepare().await.unwrap();

        watcher.on_tick().await;
        assert_eq!(watcher.current_block(), 200);

        fixture.bridge.fail_queries.store(false, Ordering::SeqCst);
        watcher.on_tick().await;

        assert_eq!(
            *fixture.bridge.queried_ranges.lock().unwrap(),
            vec![(200, 229), (200, 229)]
        );
        assert_eq!(watcher.current_block(), 230);
    }
}
