//! Parsing of the driver parameters.
//!
//! Parameters are given as a command-line style string of `name=value`
//! words. Per-device parameters name the device in brackets, e.g.
//! `fw_did[0000:03:00.0]=0xd107`.

use alloc::string::{String, ToString};

use ahash::RandomState;
use hashbrown::HashMap;
use thiserror::Error;

use crate::config::ITR_AUTO;

/// Firmware selection overrides of a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceOverride {
	pub fw_did: u32,
	pub fw_sid: u32,
	pub force_host_boot: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
	#[error("unable to split parameter string: missing closing quote")]
	Split,
	#[error("the parameter '{0}' requires a value but none was supplied")]
	MissingValue(String),
	#[error("invalid value '{value}' for parameter '{key}'")]
	InvalidValue { key: String, value: String },
	#[error("the parameter '{0}' needs a device in brackets")]
	MissingDevice(String),
}

/// Driver parameters, loaded once and shared by every device.
#[derive(Debug, Clone)]
pub struct NicConfig {
	/// Interrupt moderation: `0` off, `0xffff` auto, otherwise on
	pub itr: u32,
	/// Tx throttle rate in microseconds if moderation is on
	pub itr_tx: u32,
	/// Rx throttle rate in microseconds if moderation is on
	pub itr_rx: u32,
	pub enable_ptp: bool,
	/// Service the rings from a timer instead of interrupts
	pub polling: bool,
	overrides: HashMap<String, DeviceOverride, RandomState>,
}

impl Default for NicConfig {
	fn default() -> Self {
		Self {
			itr: ITR_AUTO,
			itr_tx: 0,
			itr_rx: 0,
			enable_ptp: true,
			polling: false,
			overrides: HashMap::with_hasher(RandomState::with_seeds(0, 0, 0, 0)),
		}
	}
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
	let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
		Some(hex) => u32::from_str_radix(hex, 16),
		None => value.parse(),
	};
	parsed.map_err(|_| ConfigError::InvalidValue {
		key: key.to_string(),
		value: value.to_string(),
	})
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
	match value {
		"1" | "y" | "Y" | "true" | "on" => Ok(true),
		"0" | "n" | "N" | "false" | "off" => Ok(false),
		_ => Err(ConfigError::InvalidValue {
			key: key.to_string(),
			value: value.to_string(),
		}),
	}
}

/// Splits `name[device]` into name and device.
fn split_device(name: &str) -> (&str, Option<&str>) {
	match name.split_once('[') {
		Some((name, rest)) => (name, rest.strip_suffix(']')),
		None => (name, None),
	}
}

impl NicConfig {
	pub fn parse(params: &str) -> Result<Self, ConfigError> {
		let mut config = Self::default();

		let words = shell_words::split(params).map_err(|_| ConfigError::Split)?;
		debug!("driver parameters = {words:?}");

		for word in words {
			let Some((key, value)) = word.split_once('=') else {
				return Err(ConfigError::MissingValue(word.clone()));
			};

			match split_device(key) {
				("itr", None) => config.itr = parse_u32(key, value)?,
				("itr_tx", None) => config.itr_tx = parse_u32(key, value)?,
				("itr_rx", None) => config.itr_rx = parse_u32(key, value)?,
				("enable_ptp", None) => config.enable_ptp = parse_bool(key, value)?,
				("polling", None) => config.polling = parse_bool(key, value)?,
				(name @ ("fw_did" | "fw_sid" | "force_host_boot"), device) => {
					let device = device.ok_or_else(|| ConfigError::MissingDevice(name.to_string()))?;
					let entry = config.overrides.entry(device.to_string()).or_default();
					match name {
						"fw_did" => entry.fw_did = parse_u32(key, value)?,
						"fw_sid" => entry.fw_sid = parse_u32(key, value)?,
						_ => entry.force_host_boot = parse_bool(key, value)?,
					}
				}
				_ => warn!("Found parameter '{key}' which wasn't expected, ignoring it"),
			}
		}

		Ok(config)
	}

	/// Overrides of the device with identity `device`, if any were given.
	pub fn device_override(&self, device: &str) -> Option<&DeviceOverride> {
		self.overrides.get(device)
	}

	pub fn set_device_override(&mut self, device: &str, value: DeviceOverride) {
		self.overrides.insert(device.to_string(), value);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults() {
		let config = NicConfig::parse("").unwrap();
		assert_eq!(config.itr, ITR_AUTO);
		assert!(config.enable_ptp);
		assert!(!config.polling);
		assert_eq!(config.device_override("0000:03:00.0"), None);
	}

	#[test]
	fn global_parameters() {
		let config =
			NicConfig::parse("itr=1 itr_tx=64 itr_rx=0x100 enable_ptp=n polling=1").unwrap();
		assert_eq!(config.itr, 1);
		assert_eq!(config.itr_tx, 64);
		assert_eq!(config.itr_rx, 256);
		assert!(!config.enable_ptp);
		assert!(config.polling);
	}

	#[test]
	fn device_overrides() {
		let config = NicConfig::parse(
			"fw_did[0000:03:00.0]=0xd107 'fw_sid[0000:03:00.0]=0x87b1' force_host_boot[0000:04:00.0]=1",
		)
		.unwrap();
		assert_eq!(
			config.device_override("0000:03:00.0"),
			Some(&DeviceOverride {
				fw_did: 0xd107,
				fw_sid: 0x87b1,
				force_host_boot: false,
			})
		);
		assert!(config.device_override("0000:04:00.0").unwrap().force_host_boot);
	}

	#[test]
	fn errors() {
		assert_eq!(
			NicConfig::parse("itr").unwrap_err(),
			ConfigError::MissingValue("itr".to_string())
		);
		assert_eq!(
			NicConfig::parse("itr=fast").unwrap_err(),
			ConfigError::InvalidValue {
				key: "itr".to_string(),
				value: "fast".to_string()
			}
		);
		assert_eq!(
			NicConfig::parse("fw_did=1").unwrap_err(),
			ConfigError::MissingDevice("fw_did".to_string())
		);
		assert_eq!(NicConfig::parse("itr='1").unwrap_err(), ConfigError::Split);
		// unknown parameters are only reported
		assert!(NicConfig::parse("debug=1").is_ok());
	}
}
