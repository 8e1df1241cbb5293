//! Transmit core of the Aquantia Atlantic multi-queue network controllers.
//!
//! The crate turns outgoing packets into hardware transmit descriptors,
//! negotiates how many queues and traffic classes a device runs with and
//! tracks link state to gate transmission. Register access, interrupt
//! plumbing and the receive path are provided by the embedding driver
//! through the traits in [`drivers::net::atlantic::hw`].
//!
//! # Cargo features
#![cfg_attr(feature = "document-features", doc = document_features::document_features!())]
#![no_std]
#![warn(clippy::all)]

extern crate alloc;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;
#[cfg(test)]
extern crate std;

#[macro_use]
mod logging;

pub mod config;
pub mod drivers;
pub mod runtime_params;

pub use crate::drivers::error::DriverError;
pub use crate::drivers::net::atlantic::error::{NicError, SubmitError, TxError, UnsupportedOffload};
pub use crate::drivers::net::atlantic::{AtlanticNic, HostResources, NicCfg};
pub use crate::runtime_params::NicConfig;
