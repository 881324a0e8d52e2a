//! Eclipse detection: does the node we rely on see the same tip as the rest
//! of the network?
//!
//! The main node's best block is compared with every external source. When
//! fewer than `tolerance_threshold` percent agree the check keeps polling
//! every `retry_interval` until the sources agree again or `max_wait` runs out.
//! Only then is the node declared eclipsed.

use super::{UseCaseError, UseCaseId};
use crate::alerts::AlertSender;
use crate::blockchain::{BestBlock, BestBlockSource};
use crate::events::{Event, EventBus};
use kanau::processor::Processor;
use lps_sdk::config::EclipseTargetConfig;
use lps_sdk::objects::NodeType;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Percentage of `matches` over `total`, rounded down. Zero sources give zero.
pub fn success_rate(matches: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rate = matches.min(total) * 100 / total;
    u8::try_from(rate).unwrap_or(100)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EclipseCheckSettings {
    pub tolerance_threshold: u8,
    pub max_wait: Duration,
    pub retry_interval: Duration,
}

impl From<&EclipseTargetConfig> for EclipseCheckSettings {
    fn from(config: &EclipseTargetConfig) -> Self {
        Self {
            tolerance_threshold: config.tolerance_threshold,
            max_wait: Duration::from_secs(config.max_wait_secs),
            retry_interval: Duration::from_secs(config.retry_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EclipseCheck;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EclipseCheckOutcome {
    Healthy { rate: u8 },
    /// The sources disagreed at first but caught up within `max_wait`.
    Recovered { rate: u8, waited: Duration },
    Detected { rate: u8, block: BestBlock },
}

pub struct EclipseCheckUseCase {
    node_type: NodeType,
    main_source: Arc<dyn BestBlockSource>,
    sources: Vec<Arc<dyn BestBlockSource>>,
    settings: EclipseCheckSettings,
    event_bus: Arc<EventBus>,
    alert_sender: Arc<dyn AlertSender>,
    recipients: Vec<String>,
    last_detection: Mutex<Option<BestBlock>>,
}

impl EclipseCheckUseCase {
    pub fn new(
        node_type: NodeType,
        main_source: Arc<dyn BestBlockSource>,
        sources: Vec<Arc<dyn BestBlockSource>>,
        settings: EclipseCheckSettings,
        event_bus: Arc<EventBus>,
        alert_sender: Arc<dyn AlertSender>,
        recipients: Vec<String>,
    ) -> Self {
        Self {
            node_type,
            main_source,
            sources,
            settings,
            event_bus,
            alert_sender,
            recipients,
            last_detection: Mutex::new(None),
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Block the node was stuck on at the last detection.
    pub fn last_detection(&self) -> Option<BestBlock> {
        self.last_detection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn sample(&self) -> Result<(u8, BestBlock), UseCaseError> {
        let main = self
            .main_source
            .best_block()
            .await
            .map_err(|e| UseCaseError::recoverable(UseCaseId::EclipseCheck, e))?;

        let mut matches = 0;
        for source in &self.sources {
            match source.best_block().await {
                Ok(block) if block == main => matches += 1,
                Ok(block) => debug!(
                    node = %self.node_type,
                    source = %source.name(),
                    height = block.height,
                    main_height = main.height,
                    "Source disagrees with main node"
                ),
                Err(e) => warn!(
                    node = %self.node_type,
                    source = %source.name(),
                    error = %e,
                    "Source unavailable, counted as mismatch"
                ),
            }
        }
        Ok((success_rate(matches, self.sources.len()), main))
    }

    async fn report(&self, rate: u8, block: &BestBlock) {
        *self
            .last_detection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(block.clone());
        error!(
            node = %self.node_type,
            rate,
            height = block.height,
            hash = %block.hash,
            "Node eclipse detected"
        );
        self.event_bus.publish(Event::NodeEclipse {
            node_type: self.node_type,
            eclipsed_block: block.clone(),
        });
        let body = format!(
            "The {} node is stuck at block {} ({}); only {rate}% of the external sources agree",
            self.node_type, block.height, block.hash
        );
        if let Err(e) = self
            .alert_sender
            .send_alert("Node eclipse detected", &body, &self.recipients)
            .await
        {
            warn!(node = %self.node_type, error = %e, "Failed to deliver eclipse alert");
        }
    }
}

impl Processor<EclipseCheck> for EclipseCheckUseCase {
    type Output = EclipseCheckOutcome;
    type Error = UseCaseError;

    async fn process(&self, _: EclipseCheck) -> Result<EclipseCheckOutcome, UseCaseError> {
        let threshold = self.settings.tolerance_threshold;
        let started = Instant::now();
        let (mut rate, mut block) = self.sample().await?;
        if rate >= threshold {
            return Ok(EclipseCheckOutcome::Healthy { rate });
        }

        info!(
            node = %self.node_type,
            rate,
            threshold,
            "Sources disagree with the node, waiting before declaring an eclipse"
        );
        while started.elapsed() < self.settings.max_wait {
            let remaining = self.settings.max_wait.saturating_sub(started.elapsed());
            tokio::time::sleep(self.settings.retry_interval.min(remaining)).await;
            (rate, block) = self.sample().await?;
            if rate >= threshold {
                return Ok(EclipseCheckOutcome::Recovered {
                    rate,
                    waited: started.elapsed(),
                });
            }
        }

        self.report(rate, &block).await;
        Ok(EclipseCheckOutcome::Detected { rate, block })
    }
}
