use super::{UseCaseError, UseCaseId};
use crate::alerts::AlertSender;
use crate::blockchain::LiquidityBridgeContract;
use kanau::processor::Processor;
use std::sync::Arc;
use tracing::warn;

/// Scan of `Penalized` events in `[from_block, to_block]`.
#[derive(Debug, Clone, Copy)]
pub struct PenalizationAlert {
    pub from_block: u64,
    pub to_block: u64,
}

/// Alerts the operators once for every penalty charged to this provider.
pub struct PenalizationAlertUseCase {
    contract: Arc<dyn LiquidityBridgeContract>,
    alert_sender: Arc<dyn AlertSender>,
    recipients: Vec<String>,
    lp_address: String,
}

impl PenalizationAlertUseCase {
    pub fn new(
        contract: Arc<dyn LiquidityBridgeContract>,
        alert_sender: Arc<dyn AlertSender>,
        recipients: Vec<String>,
        lp_address: impl Into<String>,
    ) -> Self {
        Self {
            contract,
            alert_sender,
            recipients,
            lp_address: lp_address.into(),
        }
    }
}

impl Processor<PenalizationAlert> for PenalizationAlertUseCase {
    /// Number of alerts sent.
    type Output = usize;
    type Error = UseCaseError;

    async fn process(&self, input: PenalizationAlert) -> Result<usize, UseCaseError> {
        const ID: UseCaseId = UseCaseId::PenalizationAlert;
        let events = self
            .contract
            .get_penalized_events(input.from_block, input.to_block)
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;

        let mut sent = 0;
        for event in events
            .iter()
            .filter(|e| e.liquidity_provider.eq_ignore_ascii_case(&self.lp_address))
        {
            warn!(
                quote_hash = %event.quote_hash,
                penalty = %event.penalty,
                block = event.block_number,
                "Liquidity provider was penalized"
            );
            let body = format!(
                "You were penalized for quote {} with {} wei at block {}",
                event.quote_hash, event.penalty, event.block_number
            );
            self.alert_sender
                .send_alert("Liquidity provider penalized", &body, &self.recipients)
                .await
                .map_err(|e| UseCaseError::recoverable(ID, e))?;
            sent += 1;
        }
        Ok(sent)
    }
}
