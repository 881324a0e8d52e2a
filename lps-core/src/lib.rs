//! Watcher engine of the liquidity provider server.
//!
//! Watchers poll both chains, react to bus events and drive every quote
//! through its lifecycle by calling the use cases in [`usecases`]. The
//! repositories and chain clients they depend on are traits, so the whole
//! engine can run against in-memory doubles.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod alerts;
pub mod application;
pub mod blockchain;
pub mod config;
pub mod entities;
pub mod events;
pub mod framework;
pub mod telemetry;
pub mod usecases;
pub mod utils;
pub mod watchers;

#[cfg(test)]
pub(crate) mod test_utils;
