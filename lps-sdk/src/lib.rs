//! Shared objects for the liquidity provider server.
//!
//! Everything in this crate is plain data: quote agreements, the retained
//! tracking records that the watchers mutate, lifecycle states and the
//! configuration file schema. No I/O happens here.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod objects;
