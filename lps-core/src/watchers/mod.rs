//! Long-running watchers.
//!
//! Every watcher owns a single loop that multiplexes three inputs, in this
//! priority order:
//!
//! 1. the stop signal,
//! 2. events it subscribed to on the [`EventBus`](crate::events::EventBus),
//! 3. its [`Ticker`].
//!
//! A watcher is first `prepare`d, which rehydrates its [`WorkingSet`] from the
//! repositories and may fail fatally, and then spawned through
//! [`WatcherHandle::spawn`].

pub mod btc_release;
pub mod cold_wallet;
pub mod eclipse;
pub mod liquidity_check;
pub mod pegin_bridge;
pub mod pegin_deposit;
pub mod pegout_bridge;
pub mod pegout_btc_transfer;
pub mod pegout_rsk_deposit;
pub mod penalization;
pub mod quote_cleaner;
pub mod ticker;
pub mod working_set;

use crate::blockchain::{ContractError, RpcError};
use crate::usecases::UseCaseError;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

pub use btc_release::BtcReleaseWatcher;
pub use cold_wallet::ColdWalletWatcher;
pub use eclipse::{EclipseTarget, EclipseWatcher};
pub use liquidity_check::LiquidityCheckWatcher;
pub use pegin_bridge::PeginBridgeWatcher;
pub use pegin_deposit::PeginDepositAddressWatcher;
pub use pegout_bridge::PegoutBridgeWatcher;
pub use pegout_btc_transfer::PegoutBtcTransferWatcher;
pub use pegout_rsk_deposit::PegoutRskDepositWatcher;
pub use penalization::PenalizationWatcher;
pub use quote_cleaner::QuoteCleanerWatcher;
pub use ticker::{IntervalTicker, ManualTicker, ManualTrigger, Ticker};
pub use working_set::{WorkingSet, WorkingSetReader};

/// Fatal bootstrap errors.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error(transparent)]
    UseCase(#[from] UseCaseError),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
}

/// Receiving side of a stop request.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once a stop was requested or the requesting side is gone.
    /// Cancel safe.
    pub async fn stopped(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
pub trait Watcher: Send {
    fn name(&self) -> &'static str;

    /// One-shot initialisation before the loop starts.
    async fn prepare(&mut self) -> Result<(), WatcherError>;

    /// Runs the loop until `stop` fires.
    async fn start(&mut self, stop: StopSignal);
}

/// Source of the current unix time, in seconds.
pub type Clock = fn() -> u64;

pub fn unix_now() -> u64 {
    u64::try_from(time::OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0)
}

/// Last height a watcher acted on.
///
/// Only moves forward: a tip that did not advance, or went backwards after a
/// reorg or a lagging node, is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHeight(Option<u64>);

impl BlockHeight {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn at(height: u64) -> Self {
        Self(Some(height))
    }

    pub fn get(&self) -> Option<u64> {
        self.0
    }

    /// Returns `true` and records `height` when it is strictly greater.
    pub fn advance(&mut self, height: u64) -> bool {
        match self.0 {
            Some(current) if height <= current => false,
            _ => {
                self.0 = Some(height);
                true
            }
        }
    }
}

/// Running watcher.
pub struct WatcherHandle {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl WatcherHandle {
    /// Spawns the loop of an already prepared watcher.
    pub fn spawn(mut watcher: Box<dyn Watcher>) -> Self {
        let name = watcher.name();
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            info!(watcher = name, "Watcher started");
            watcher.start(StopSignal::new(stop_rx)).await;
            info!(watcher = name, "Watcher shutdown complete");
        });
        Self {
            name,
            stop_tx,
            join: Mutex::new(Some(join)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Requests a stop and waits for the loop to exit. The work in flight
    /// finishes first. Later calls return immediately.
    pub async fn shutdown(&self) {
        self.stop_tx.send_replace(true);
        let join = self.join.lock().await.take();
        if let Some(join) = join
            && let Err(e) = join.await
        {
            error!(watcher = self.name, error = %e, "Watcher task failed");
        }
    }
}
