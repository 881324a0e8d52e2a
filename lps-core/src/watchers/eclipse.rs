//! Periodic eclipse check of the bitcoin and rootstock nodes.
//!
//! Every tick runs [`EclipseCheckUseCase`] for each target that is not cooling
//! down. A detection parks the target for its cooldown; a one-shot timer task
//! then queues the node type back into the watcher's own loop so the state is
//! only ever touched from there.

use super::{StopSignal, Ticker, Watcher, WatcherError};
use crate::usecases::{EclipseCheck, EclipseCheckOutcome, EclipseCheckUseCase};
use async_trait::async_trait;
use kanau::processor::Processor;
use lps_sdk::objects::NodeType;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const NAME: &str = "EclipseWatcher";

pub struct EclipseTarget {
    check: Arc<EclipseCheckUseCase>,
    cooldown: Duration,
    in_cooldown: bool,
    timer: Option<JoinHandle<()>>,
}

impl EclipseTarget {
    pub fn new(check: Arc<EclipseCheckUseCase>, cooldown: Duration) -> Self {
        Self {
            check,
            cooldown,
            in_cooldown: false,
            timer: None,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.check.node_type()
    }

    pub fn in_cooldown(&self) -> bool {
        self.in_cooldown
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

pub struct EclipseWatcher {
    targets: Vec<EclipseTarget>,
    resume_tx: mpsc::Sender<NodeType>,
    resume_rx: mpsc::Receiver<NodeType>,
    ticker: Box<dyn Ticker>,
}

impl EclipseWatcher {
    pub fn new(targets: Vec<EclipseTarget>, ticker: Box<dyn Ticker>) -> Self {
        let (resume_tx, resume_rx) = mpsc::channel(targets.len().max(1));
        Self {
            targets,
            resume_tx,
            resume_rx,
            ticker,
        }
    }

    pub fn in_cooldown(&self, node_type: NodeType) -> bool {
        self.targets
            .iter()
            .any(|t| t.node_type() == node_type && t.in_cooldown)
    }

    pub(crate) async fn on_tick(&mut self) {
        for target in self.targets.iter_mut().filter(|t| !t.in_cooldown) {
            let node = target.node_type();
            match target.check.process(EclipseCheck).await {
                Ok(EclipseCheckOutcome::Healthy { rate }) => {
                    debug!(watcher = NAME, node = %node, rate, "Node is in sync");
                }
                Ok(EclipseCheckOutcome::Recovered { rate, waited }) => {
                    info!(watcher = NAME, node = %node, rate, waited = ?waited, "Sources caught up with the node");
                }
                Ok(EclipseCheckOutcome::Detected { rate, block }) => {
                    error!(
                        watcher = NAME,
                        node = %node,
                        rate,
                        height = block.height,
                        cooldown = ?target.cooldown,
                        "Eclipse detected, pausing checks"
                    );
                    target.in_cooldown = true;
                    let resume_tx = self.resume_tx.clone();
                    let cooldown = target.cooldown;
                    target.timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(cooldown).await;
                        let _ = resume_tx.send(node).await;
                    }));
                }
                Err(e) => {
                    warn!(watcher = NAME, node = %node, error = %e, "Eclipse check failed");
                }
            }
        }
    }

    pub(crate) fn resume(&mut self, node_type: NodeType) {
        for target in self
            .targets
            .iter_mut()
            .filter(|t| t.node_type() == node_type)
        {
            target.in_cooldown = false;
            target.timer = None;
            info!(watcher = NAME, node = %node_type, "Cooldown over, resuming checks");
        }
    }

    fn stop_timers(&mut self) {
        for target in &mut self.targets {
            target.stop_timer();
        }
    }
}

#[async_trait]
impl Watcher for EclipseWatcher {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn prepare(&mut self) -> Result<(), WatcherError> {
        let nodes: Vec<String> = self.targets.iter().map(|t| t.node_type().to_string()).collect();
        info!(watcher = NAME, targets = ?nodes, "Eclipse targets configured");
        Ok(())
    }

    async fn start(&mut self, mut stop: StopSignal) {
        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => {
                    self.ticker.stop();
                    self.stop_timers();
                    break;
                }
                Some(node_type) = self.resume_rx.recv() => self.resume(node_type),
                _ = self.ticker.tick() => self.on_tick().await,
            }
        }
    }
}
