//! Fan-out of events to per-subscriber bounded channels.

use super::types::{Event, EventId};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Default buffer size for subscriber channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

pub type EventReceiver = mpsc::Receiver<Event>;

/// In-process publish/subscribe hub.
///
/// `publish` never waits: a subscriber whose buffer is full misses the event,
/// a subscriber whose receiver was dropped is pruned.
pub struct EventBus {
    subscribers: Mutex<HashMap<EventId, Vec<mpsc::Sender<Event>>>>,
    buffer: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_CHANNEL_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self, id: EventId) -> EventReceiver {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .push(tx);
        rx
    }

    pub fn publish(&self, event: Event) {
        let id = event.id();
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(senders) = subscribers.get_mut(&id) else {
            debug!(event = %id, "No subscriber for event");
            return;
        };
        senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(event = %id, "Subscriber channel full, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(event = %id, "Pruning closed subscriber");
                false
            }
        });
    }

    pub fn subscriber_count(&self, id: EventId) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
