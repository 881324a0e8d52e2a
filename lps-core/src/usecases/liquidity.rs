//! Periodic liquidity check of both hot wallets.

use crate::alerts::AlertSender;
use crate::blockchain::{BitcoinWallet, RskWallet};
use kanau::processor::Processor;
use rust_decimal::Decimal;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckLiquidity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiquidityOutcome {
    Sufficient,
    AlertSent,
    /// The balance could not be read or the alert could not be delivered.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityReport {
    pub pegin: LiquidityOutcome,
    pub pegout: LiquidityOutcome,
}

pub struct CheckLiquidityUseCase {
    rsk_wallet: Arc<dyn RskWallet>,
    btc_wallet: Arc<dyn BitcoinWallet>,
    alert_sender: Arc<dyn AlertSender>,
    recipients: Vec<String>,
    min_pegin_liquidity: Decimal,
    min_pegout_liquidity: u64,
}

impl CheckLiquidityUseCase {
    pub fn new(
        rsk_wallet: Arc<dyn RskWallet>,
        btc_wallet: Arc<dyn BitcoinWallet>,
        alert_sender: Arc<dyn AlertSender>,
        recipients: Vec<String>,
        min_pegin_liquidity: Decimal,
        min_pegout_liquidity: u64,
    ) -> Self {
        Self {
            rsk_wallet,
            btc_wallet,
            alert_sender,
            recipients,
            min_pegin_liquidity,
            min_pegout_liquidity,
        }
    }

    async fn alert(&self, subject: &str, body: String) -> LiquidityOutcome {
        match self
            .alert_sender
            .send_alert(subject, &body, &self.recipients)
            .await
        {
            Ok(()) => LiquidityOutcome::AlertSent,
            Err(e) => {
                warn!(error = %e, subject, "Failed to deliver liquidity alert");
                LiquidityOutcome::Failed(e.to_string())
            }
        }
    }

    async fn check_pegin(&self) -> LiquidityOutcome {
        let balance = match self.rsk_wallet.balance().await {
            Ok(balance) => balance,
            Err(e) => return LiquidityOutcome::Failed(e.to_string()),
        };
        if balance >= self.min_pegin_liquidity {
            return LiquidityOutcome::Sufficient;
        }
        self.alert(
            "Low peg-in liquidity",
            format!(
                "RBTC balance {balance} wei is below the minimum of {} wei",
                self.min_pegin_liquidity
            ),
        )
        .await
    }

    async fn check_pegout(&self) -> LiquidityOutcome {
        let balance = match self.btc_wallet.balance().await {
            Ok(balance) => balance,
            Err(e) => return LiquidityOutcome::Failed(e.to_string()),
        };
        if balance >= self.min_pegout_liquidity {
            return LiquidityOutcome::Sufficient;
        }
        self.alert(
            "Low peg-out liquidity",
            format!(
                "BTC balance {balance} sats is below the minimum of {} sats",
                self.min_pegout_liquidity
            ),
        )
        .await
    }
}

impl Processor<CheckLiquidity> for CheckLiquidityUseCase {
    type Output = LiquidityReport;
    type Error = Infallible;

    async fn process(&self, _: CheckLiquidity) -> Result<LiquidityReport, Infallible> {
        let pegin = self.check_pegin().await;
        let pegout = self.check_pegout().await;
        info!(pegin = ?pegin, pegout = ?pegout, "Liquidity check complete");
        Ok(LiquidityReport { pegin, pegout })
    }
}
