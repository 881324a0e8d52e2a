//! Sweeps hot-wallet balance above the configured thresholds to cold storage.

use crate::blockchain::{BitcoinWallet, RskWallet, WalletSigner};
use kanau::processor::Processor;
use lps_sdk::config::ColdWalletConfig;
use rust_decimal::Decimal;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColdWalletSettings {
    pub btc_address: String,
    pub rsk_address: String,
    pub btc_hot_threshold: u64,
    pub rsk_hot_threshold: Decimal,
    pub btc_min_transfer: u64,
    pub rsk_min_transfer: Decimal,
}

impl From<&ColdWalletConfig> for ColdWalletSettings {
    fn from(config: &ColdWalletConfig) -> Self {
        Self {
            btc_address: config.btc_address.clone(),
            rsk_address: config.rsk_address.clone(),
            btc_hot_threshold: config.btc_hot_threshold,
            rsk_hot_threshold: config.rsk_hot_threshold,
            btc_min_transfer: config.btc_min_transfer,
            rsk_min_transfer: config.rsk_min_transfer,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ColdWalletTransfer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// `amount` is in satoshis for bitcoin and wei for rootstock.
    Transferred { tx_hash: String, amount: Decimal },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColdWalletReport {
    pub btc: TransferOutcome,
    pub rsk: TransferOutcome,
}

pub struct ColdWalletTransferUseCase {
    btc_wallet: Arc<dyn BitcoinWallet>,
    rsk_wallet: Arc<dyn RskWallet>,
    btc_signer: WalletSigner,
    rsk_signer: WalletSigner,
    settings: ColdWalletSettings,
}

impl ColdWalletTransferUseCase {
    pub fn new(
        btc_wallet: Arc<dyn BitcoinWallet>,
        rsk_wallet: Arc<dyn RskWallet>,
        btc_signer: WalletSigner,
        rsk_signer: WalletSigner,
        settings: ColdWalletSettings,
    ) -> Self {
        Self {
            btc_wallet,
            rsk_wallet,
            btc_signer,
            rsk_signer,
            settings,
        }
    }

    async fn transfer_btc(&self) -> TransferOutcome {
        let balance = match self.btc_wallet.balance().await {
            Ok(balance) => balance,
            Err(e) => return TransferOutcome::Failed { error: e.to_string() },
        };
        let excess = balance.saturating_sub(self.settings.btc_hot_threshold);
        if excess == 0 || excess < self.settings.btc_min_transfer {
            return TransferOutcome::Skipped {
                reason: format!("excess of {excess} sats is below the minimum transfer"),
            };
        }

        let result = {
            let permit = self.btc_signer.acquire().await;
            self.btc_wallet
                .send(&permit, &self.settings.btc_address, excess)
                .await
        };
        match result {
            Ok(tx_hash) => TransferOutcome::Transferred {
                tx_hash,
                amount: Decimal::from(excess),
            },
            Err(e) => TransferOutcome::Failed { error: e.to_string() },
        }
    }

    async fn transfer_rsk(&self) -> TransferOutcome {
        let balance = match self.rsk_wallet.balance().await {
            Ok(balance) => balance,
            Err(e) => return TransferOutcome::Failed { error: e.to_string() },
        };
        let excess = (balance - self.settings.rsk_hot_threshold).max(Decimal::ZERO);
        if excess.is_zero() || excess < self.settings.rsk_min_transfer {
            return TransferOutcome::Skipped {
                reason: format!("excess of {excess} wei is below the minimum transfer"),
            };
        }

        let result = {
            let permit = self.rsk_signer.acquire().await;
            self.rsk_wallet
                .send_value(&permit, &self.settings.rsk_address, excess)
                .await
        };
        match result {
            Ok(receipt) if receipt.succeeded => TransferOutcome::Transferred {
                tx_hash: receipt.tx_hash,
                amount: excess,
            },
            Ok(receipt) => TransferOutcome::Failed {
                error: format!("transaction {} reverted", receipt.tx_hash),
            },
            Err(e) => TransferOutcome::Failed { error: e.to_string() },
        }
    }
}

impl Processor<ColdWalletTransfer> for ColdWalletTransferUseCase {
    type Output = ColdWalletReport;
    type Error = Infallible;

    async fn process(&self, _: ColdWalletTransfer) -> Result<ColdWalletReport, Infallible> {
        let btc = self.transfer_btc().await;
        let rsk = self.transfer_rsk().await;
        for (chain, outcome) in [("bitcoin", &btc), ("rootstock", &rsk)] {
            match outcome {
                TransferOutcome::Transferred { tx_hash, amount } => {
                    info!(chain, tx_hash = %tx_hash, amount = %amount, "Moved excess liquidity to cold wallet")
                }
                TransferOutcome::Skipped { reason } => {
                    info!(chain, reason = %reason, "Cold wallet transfer skipped")
                }
                TransferOutcome::Failed { error } => {
                    warn!(chain, error = %error, "Cold wallet transfer failed")
                }
            }
        }
        Ok(ColdWalletReport { btc, rsk })
    }
}
