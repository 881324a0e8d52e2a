//! Periodic liquidity check of both hot wallets.

use super::{StopSignal, Ticker, Watcher, WatcherError};
use crate::usecases::{CheckLiquidity, CheckLiquidityUseCase, LiquidityOutcome, LiquidityReport};
use async_trait::async_trait;
use kanau::processor::Processor;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const NAME: &str = "LiquidityCheckWatcher";

pub struct LiquidityCheckWatcher {
    check_liquidity: CheckLiquidityUseCase,
    timeout: Duration,
    ticker: Box<dyn Ticker>,
}

impl LiquidityCheckWatcher {
    pub fn new(
        check_liquidity: CheckLiquidityUseCase,
        timeout: Duration,
        ticker: Box<dyn Ticker>,
    ) -> Self {
        Self {
            check_liquidity,
            timeout,
            ticker,
        }
    }

    /// `None` when the check did not finish in time.
    pub(crate) async fn on_tick(&mut self) -> Option<LiquidityReport> {
        let report = match tokio::time::timeout(
            self.timeout,
            self.check_liquidity.process(CheckLiquidity),
        )
        .await
        {
            Ok(Ok(report)) => report,
            Ok(Err(never)) => match never {},
            Err(_) => {
                error!(watcher = NAME, timeout = ?self.timeout, "Liquidity check timed out");
                return None;
            }
        };
        for (flow, outcome) in [("pegin", &report.pegin), ("pegout", &report.pegout)] {
            match outcome {
                LiquidityOutcome::Sufficient => {
                    debug!(watcher = NAME, flow, "Liquidity sufficient");
                }
                LiquidityOutcome::AlertSent => {
                    info!(watcher = NAME, flow, "Low liquidity alert sent");
                }
                LiquidityOutcome::Failed(e) => {
                    warn!(watcher = NAME, flow, error = %e, "Liquidity check failed");
                }
            }
        }
        Some(report)
    }
}

#[async_trait]
impl Watcher for LiquidityCheckWatcher {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{BitcoinWallet, RpcError, SigningPermit};
    use crate::test_utils::{MockAlertSender, MockBitcoinWallet, MockRskWallet};
    use crate::watchers::ManualTicker;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    /// Balance query that never answers within the test timeout.
    struct StalledWallet;

    #[async_trait]
    impl BitcoinWallet for StalledWallet {
        async fn balance(&self) -> Result<u64, RpcError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(0)
        }

        async fn send(
            &self,
            _permit: &SigningPermit,
            _address: &str,
            _satoshis: u64,
        ) -> Result<String, RpcError> {
            Err(RpcError::Decode("not supported".to_string()))
        }

        async fn send_with_op_return(
            &self,
            _permit: &SigningPermit,
            _address: &str,
            _satoshis: u64,
            _op_return: &[u8],
        ) -> Result<String, RpcError> {
            Err(RpcError::Decode("not supported".to_string()))
        }
    }

    fn watcher(
        btc_wallet: Arc<dyn BitcoinWallet>,
        alerts: Arc<MockAlertSender>,
    ) -> LiquidityCheckWatcher {
        let use_case = CheckLiquidityUseCase::new(
            Arc::new(MockRskWallet::default()),
            btc_wallet,
            alerts,
            vec!["ops@example.com".to_string()],
            Decimal::from(5_000_000_000_000_000_000u64),
            200_000_000,
        );
        let (ticker, _trigger) = ManualTicker::new();
        LiquidityCheckWatcher::new(use_case, Duration::from_secs(60), Box::new(ticker))
    }

    #[tokio::test]
    async fn test_low_btc_balance_alerts() {
        let alerts = Arc::new(MockAlertSender::default());
        let mut watcher = watcher(Arc::new(MockBitcoinWallet::default()), alerts.clone());

        let report = watcher.on_tick().await.unwrap();

        assert_eq!(report.pegin, LiquidityOutcome::Sufficient);
        assert_eq!(report.pegout, LiquidityOutcome::AlertSent);
        assert_eq!(alerts.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_funded_wallets_raise_no_alert() {
        let alerts = Arc::new(MockAlertSender::default());
        let btc_wallet = MockBitcoinWallet::default();
        btc_wallet
            .balance
            .store(300_000_000, std::sync::atomic::Ordering::SeqCst);
        let mut watcher = watcher(Arc::new(btc_wallet), alerts.clone());

        let report = watcher.on_tick().await.unwrap();

        assert_eq!(report.pegin, LiquidityOutcome::Sufficient);
        assert_eq!(report.pegout, LiquidityOutcome::Sufficient);
        assert!(alerts.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_check_times_out() {
        let alerts = Arc::new(MockAlertSender::default());
        let mut watcher = watcher(Arc::new(StalledWallet), alerts.clone());
        let started = tokio::time::Instant::now();

        assert!(watcher.on_tick().await.is_none());
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert!(alerts.sent.lock().unwrap().is_empty());
    }
}
