//! A module containing the driver, the driver trait and driver specific errors.

pub mod net;

pub type InterruptLine = u8;

/// A common error module for drivers.
/// [DriverError](error::DriverError) values will be
/// passed on to higher layers.
pub mod error {
	use thiserror::Error;

	use crate::drivers::net::atlantic::error::NicError;
	use crate::drivers::net::atlantic::hw::{MappingError, QueryError};
	use crate::drivers::net::atlantic::ring::RingError;
	use crate::runtime_params::ConfigError;

	#[derive(Error, Debug)]
	pub enum DriverError {
		#[error("Atlantic driver failed: {0}")]
		Nic(#[from] NicError),

		#[error("Invalid driver parameters: {0}")]
		Config(#[from] ConfigError),

		#[error("Ring operation failed: {0}")]
		Ring(#[from] RingError),

		#[error("Link query failed: {0}")]
		Query(#[from] QueryError),

		#[error("DMA mapping failed: {0}")]
		Mapping(#[from] MappingError),
	}
}

/// A trait to determine general driver information
pub trait Driver {
	/// Returns the interrupt number of the device
	fn get_interrupt_number(&self) -> InterruptLine;

	/// Returns the device driver name
	fn get_name(&self) -> &'static str;
}
