//! Core of the IRC channel logger.
//!
//! Transport-agnostic: the relay connection comes in through the
//! [`ports::Connector`] port, implemented in adapter crates.

pub mod backoff;
pub mod classify;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod framing;
pub mod logging;
pub mod ports;
pub mod protocol;
pub mod session;
pub mod sink;

pub use errors::{Error, Result};
