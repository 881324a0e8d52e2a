//! Tick sources driving the watcher loops.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

/// Something a watcher loop can wait on between rounds of work.
///
/// `tick` must be cancel safe: it is polled inside `tokio::select!`.
#[async_trait]
pub trait Ticker: Send {
    /// Resolves on the next tick. Never resolves once stopped.
    async fn tick(&mut self);

    fn stop(&mut self);
}

/// Fixed period ticker. The first tick completes immediately.
///
/// A tick that is missed because the loop was busy is delayed rather than
/// replayed in a burst.
pub struct IntervalTicker {
    interval: Option<Interval>,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval: Some(interval),
        }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    fn stop(&mut self) {
        self.interval = None;
    }
}

/// Ticker fired by hand through a [`ManualTrigger`].
pub struct ManualTicker {
    rx: mpsc::Receiver<()>,
    stopped: bool,
}

#[derive(Debug, Clone)]
pub struct ManualTrigger(mpsc::Sender<()>);

impl ManualTrigger {
    /// Queues one tick. Returns `false` once the ticker is gone.
    pub async fn fire(&self) -> bool {
        self.0.send(()).await.is_ok()
    }
}

impl ManualTicker {
    pub fn new() -> (Self, ManualTrigger) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self { rx, stopped: false },
            ManualTrigger(tx),
        )
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        if self.stopped {
            return std::future::pending().await;
        }
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.rx.close();
    }
}
