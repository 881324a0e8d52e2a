//! Deletes quotes whose deposit window elapsed.

use super::{StopSignal, Ticker, Watcher, WatcherError};
use crate::usecases::{CleanExpiredQuotes, CleanExpiredQuotesUseCase};
use async_trait::async_trait;
use kanau::processor::Processor;
use tracing::{debug, error, info};

const NAME: &str = "QuoteCleanerWatcher";

pub struct QuoteCleanerWatcher {
    clean: CleanExpiredQuotesUseCase,
    ticker: Box<dyn Ticker>,
}

impl QuoteCleanerWatcher {
    pub fn new(clean: CleanExpiredQuotesUseCase, ticker: Box<dyn Ticker>) -> Self {
        Self { clean, ticker }
    }

    pub(crate) async fn on_tick(&mut self) {
        match self.clean.process(CleanExpiredQuotes).await {
            Ok(hashes) if hashes.is_empty() => {
                debug!(watcher = NAME, "No expired quotes");
            }
            Ok(hashes) => {
                info!(watcher = NAME, count = hashes.len(), quotes = ?hashes, "Expired quotes deleted");
            }
            Err(e) => {
                error!(watcher = NAME, error = %e, "Failed to clean expired quotes");
            }
        }
    }
}

#[async_trait]
impl Watcher for QuoteCleanerWatcher {
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
