//! Process-wide event bus.
//!
//! Use cases publish [`Event`]s after a state change that another watcher
//! should react to immediately, instead of waiting for its next poll.
//!
//! # Event Flow
//!
//! 1. API layer emits `AcceptedPeginQuote` -> `PeginDepositAddressWatcher`
//! 2. `CallForUserUseCase` emits `CallForUserCompleted` -> `PeginBridgeWatcher`
//! 3. API layer emits `AcceptedPegoutQuote` -> `PegoutRskDepositWatcher`
//! 4. `SendPegoutUseCase` emits `PegoutBtcSentToUser` -> `PegoutBtcTransferWatcher`
//! 5. `EclipseCheckUseCase` emits `NodeEclipse` for whoever listens
//!
//! Delivery is fire-and-forget. A missed event is compensated by the next
//! periodic poll of the receiving watcher.

pub mod bus;
pub mod types;

pub use bus::{DEFAULT_CHANNEL_BUFFER, EventBus, EventReceiver};
pub use types::{Event, EventId};
