//! Interrupt moderation (ITR) settings.
//!
//! Timer values are programmed in units of 2 µs. In auto mode the minimum and
//! maximum throttle interval is taken from a table indexed by link speed.

use crate::config::ITR_AUTO;

const ITR_EN: u32 = 0x2;
const ITR_MAX: u32 = 0x1ff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItrMode {
	Off,
	/// Fixed throttle rates in microseconds
	On {
		tx_usecs: u32,
		rx_usecs: u32,
	},
	#[default]
	Auto,
}

impl ItrMode {
	/// Interprets the `itr` module parameter: `0` is off, [`ITR_AUTO`] is
	/// auto, anything else takes the explicit tx/rx rates.
	pub fn from_param(itr: u32, tx_usecs: u32, rx_usecs: u32) -> Self {
		match itr {
			0 => Self::Off,
			ITR_AUTO => Self::Auto,
			_ => Self::On { tx_usecs, rx_usecs },
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItrTiming {
	pub min: u32,
	pub max: u32,
}

impl ItrTiming {
	const fn new(min: u32, max: u32) -> Self {
		Self { min, max }
	}

	pub fn reg(&self) -> u32 {
		ITR_EN | (self.min << 8) | (self.max << 16)
	}

	/// Throttle interval as reported to the user.
	pub fn usecs(&self) -> u32 {
		self.max * 2
	}
}

// 10G, 5G, 5G-SR, 2.5G, 1G, 100M
const TX_TIMERS: [ItrTiming; 6] = [
	ItrTiming::new(0xf, 0xff),
	ItrTiming::new(0xf, 0x1ff),
	ItrTiming::new(0xf, 0x1ff),
	ItrTiming::new(0xf, 0x1ff),
	ItrTiming::new(0xf, 0x1ff),
	ItrTiming::new(0xf, 0x1ff),
];

const RX_TIMERS: [ItrTiming; 6] = [
	ItrTiming::new(0x6, 0x38),
	ItrTiming::new(0xc, 0x70),
	ItrTiming::new(0xc, 0x70),
	ItrTiming::new(0x18, 0xe0),
	ItrTiming::new(0x30, 0x80),
	ItrTiming::new(0x4, 0x50),
];

fn speed_index(mbps: u32) -> usize {
	match mbps {
		5000 => 1,
		2500 => 3,
		1000 => 4,
		100 => 5,
		_ => 0,
	}
}

/// Moderation settings handed to [`HwOps::set_interrupt_moderation`](super::hw::HwOps::set_interrupt_moderation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItrSettings {
	pub mode: ItrMode,
	pub mbps: u32,
	/// `None` disables moderation for the direction
	pub tx: Option<ItrTiming>,
	pub rx: Option<ItrTiming>,
}

impl ItrSettings {
	pub fn compute(mode: ItrMode, mbps: u32) -> Self {
		let (tx, rx) = match mode {
			ItrMode::Off => (None, None),
			ItrMode::On { tx_usecs, rx_usecs } => (
				Some(ItrTiming::new(0, (tx_usecs / 2).min(ITR_MAX))),
				Some(ItrTiming::new(0, (rx_usecs / 2).min(ITR_MAX))),
			),
			ItrMode::Auto => {
				let idx = speed_index(mbps);
				(Some(TX_TIMERS[idx]), Some(RX_TIMERS[idx]))
			}
		};

		Self { mode, mbps, tx, rx }
	}

	pub fn tx_reg(&self) -> u32 {
		self.tx.map_or(0, |t| t.reg())
	}

	pub fn rx_reg(&self) -> u32 {
		self.rx.map_or(0, |t| t.reg())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn param_modes() {
		assert_eq!(ItrMode::from_param(0, 10, 10), ItrMode::Off);
		assert_eq!(ItrMode::from_param(ITR_AUTO, 10, 10), ItrMode::Auto);
		assert_eq!(
			ItrMode::from_param(1, 64, 256),
			ItrMode::On {
				tx_usecs: 64,
				rx_usecs: 256
			}
		);
	}

	#[test]
	fn auto_follows_speed() {
		let ten = ItrSettings::compute(ItrMode::Auto, 10000);
		assert_eq!(ten.rx, Some(ItrTiming { min: 0x6, max: 0x38 }));
		assert_eq!(ten.tx_reg(), 0x2 | (0xf << 8) | (0xff << 16));

		let one = ItrSettings::compute(ItrMode::Auto, 1000);
		assert_eq!(one.rx, Some(ItrTiming { min: 0x30, max: 0x80 }));
		assert_eq!(one.rx.map(|t| t.usecs()), Some(0x100));

		// unknown speeds use the 10G row
		let down = ItrSettings::compute(ItrMode::Auto, 0);
		assert_eq!(down.rx, ten.rx);
	}

	#[test]
	fn fixed_rates_are_clamped() {
		let s = ItrSettings::compute(
			ItrMode::On {
				tx_usecs: 100,
				rx_usecs: 5000,
			},
			10000,
		);
		assert_eq!(s.tx, Some(ItrTiming { min: 0, max: 50 }));
		assert_eq!(s.rx, Some(ItrTiming { min: 0, max: 0x1ff }));
	}

	#[test]
	fn off_disables() {
		let s = ItrSettings::compute(ItrMode::Off, 10000);
		assert_eq!(s.tx_reg(), 0);
		assert_eq!(s.rx_reg(), 0);
	}
}
