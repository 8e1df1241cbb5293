//! Link supervision.
//!
//! The supervisor polls the firmware for the link state, opens and closes the
//! transmit path on carrier changes and reprograms everything that depends on
//! the link speed.

use alloc::vec::Vec;

use heapless::Deque;
use hermit_sync::SpinMutex;

use crate::drivers::net::atlantic::hw::{
	Duplex, FlowControl, HwError, HwOps, LinkQuery, PtpLinkState, QueryError,
};
use crate::drivers::net::atlantic::moderation::{ItrMode, ItrSettings};

pub const LINK_EVENT_QUEUE_LEN: usize = 16;

bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct NicFlags: u32 {
		const STARTED = 0x0000_0004;
		const STOPPING = 0x0000_0008;
		const RESETTING = 0x0000_0010;
		const CLOSING = 0x0000_0020;
		const LINK_DOWN = 0x0400_0000;
		const ERR_UNPLUG = 0x4000_0000;
		const ERR_HW = 0x8000_0000;

		const NOT_READY = Self::STOPPING.bits()
			| Self::RESETTING.bits()
			| Self::CLOSING.bits()
			| Self::ERR_UNPLUG.bits()
			| Self::ERR_HW.bits();
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
	Down,
	Up { mbps: u32, duplex: Duplex },
}

impl LinkState {
	pub fn mbps(&self) -> u32 {
		match self {
			Self::Down => 0,
			Self::Up { mbps, .. } => *mbps,
		}
	}

	pub fn is_up(&self) -> bool {
		matches!(self, Self::Up { .. })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
	Up { mbps: u32, duplex: Duplex },
	Down,
	SpeedChanged { from: u32, to: u32 },
}

/// Bounded single-consumer queue of link events.
///
/// If the consumer falls behind, the oldest event is dropped.
pub struct LinkEvents(SpinMutex<Deque<LinkEvent, LINK_EVENT_QUEUE_LEN>>);

impl LinkEvents {
	pub const fn new() -> Self {
		Self(SpinMutex::new(Deque::new()))
	}

	pub fn push(&self, event: LinkEvent) {
		let mut queue = self.0.lock();
		if queue.is_full()
			&& let Some(dropped) = queue.pop_front()
		{
			warn!("Link event queue full, dropping {dropped:?}");
		}
		if queue.push_back(event).is_err() {
			warn!("Unable to queue link event {event:?}");
		}
	}

	pub fn drain(&self) -> Vec<LinkEvent> {
		let mut queue = self.0.lock();
		let mut events = Vec::with_capacity(queue.len());
		while let Some(event) = queue.pop_front() {
			events.push(event);
		}
		events
	}

	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}
}

impl Default for LinkEvents {
	fn default() -> Self {
		Self::new()
	}
}

/// Carrier control of the transmit queues.
pub trait QueueControl {
	/// Opens the transmit gate and wakes every queue.
	fn wake_all(&self);

	/// Closes the transmit gate and stops every queue.
	fn disable_all(&self);
}

/// Device settings the supervisor applies on link changes.
#[derive(Debug, Clone, Copy)]
pub struct LinkPolicy<'a> {
	pub itr: ItrMode,
	pub ptp: bool,
	/// The hardware can pause its transmitter on request
	pub flow_control: bool,
	pub tc_max_rate: &'a [u32],
	pub tc_min_rate: &'a [u32],
}

pub struct LinkSupervisor {
	state: LinkState,
	flow_control: FlowControl,
	flags: NicFlags,
}

impl LinkSupervisor {
	pub const fn new() -> Self {
		Self {
			state: LinkState::Down,
			flow_control: FlowControl::empty(),
			flags: NicFlags::empty(),
		}
	}

	pub fn state(&self) -> LinkState {
		self.state
	}

	/// Flow control negotiated by the firmware at the last successful query.
	pub fn flow_control(&self) -> FlowControl {
		self.flow_control
	}

	pub fn flags(&self) -> NicFlags {
		self.flags
	}

	pub fn set_flags(&mut self, flags: NicFlags) {
		self.flags.insert(flags);
	}

	pub fn clear_flags(&mut self, flags: NicFlags) {
		self.flags.remove(flags);
	}

	pub fn is_ready(&self) -> bool {
		!self.flags.intersects(NicFlags::NOT_READY)
	}

	/// Queries the link and acts on any change.
	///
	/// A failed query leaves the state untouched.
	pub fn update<Q, H, C>(
		&mut self,
		query: &Q,
		hw: &H,
		queues: &C,
		events: &LinkEvents,
		policy: &LinkPolicy<'_>,
	) -> Result<Option<LinkEvent>, QueryError>
	where
		Q: LinkQuery + ?Sized,
		H: HwOps + ?Sized,
		C: QueueControl + ?Sized,
	{
		let status = query.query().inspect_err(|err| {
			warn!("Link status query failed: {err}");
		})?;

		self.flow_control = status.flow_control;

		let old_mbps = self.state.mbps();
		if old_mbps != status.mbps {
			info!("Link change old {old_mbps} new {}", status.mbps);

			let itr = ItrSettings::compute(policy.itr, status.mbps);
			if let Err(err) = hw.set_interrupt_moderation(&itr) {
				error!("Unable to update interrupt moderation: {err}");
			}

			if policy.ptp {
				let ptp_link_good = status.mbps >= 100 && status.duplex == Duplex::Full;
				hw.ptp_clock_init(if ptp_link_good {
					PtpLinkState::LinkUp
				} else {
					PtpLinkState::NoLink
				});
				hw.ptp_offset_set(status.mbps);
			}

			if policy.flow_control {
				match hw.set_flow_control(status.flow_control) {
					Ok(()) | Err(HwError::NotSupported) => {}
					Err(err) => error!("Unable to apply flow control: {err}"),
				}
			}
		}

		let new_state = if status.mbps == 0 {
			LinkState::Down
		} else {
			LinkState::Up {
				mbps: status.mbps,
				duplex: status.duplex,
			}
		};

		let event = match (self.state, new_state) {
			(LinkState::Down, LinkState::Up { mbps, duplex }) => {
				self.flags.insert(NicFlags::STARTED);
				self.flags.remove(NicFlags::LINK_DOWN);
				hw.pm_get();

				match hw.tc_rate_limit_set(policy.tc_max_rate, policy.tc_min_rate) {
					Ok(()) | Err(HwError::NotSupported) => {}
					Err(err) => error!("Unable to apply tc rate limits: {err}"),
				}

				queues.wake_all();
				info!("Link up: {mbps} Mbps, {duplex:?} duplex");
				Some(LinkEvent::Up { mbps, duplex })
			}
			(LinkState::Up { .. }, LinkState::Down) => {
				queues.disable_all();
				self.flags.insert(NicFlags::LINK_DOWN);
				hw.pm_put();
				info!("Link down");
				Some(LinkEvent::Down)
			}
			(LinkState::Up { mbps: from, .. }, LinkState::Up { mbps: to, .. }) if from != to => {
				Some(LinkEvent::SpeedChanged { from, to })
			}
			_ => None,
		};

		self.state = new_state;
		if let Some(event) = event {
			events.push(event);
		}

		Ok(event)
	}

	/// Drops the carrier without asking the firmware, used when the device stops.
	pub fn force_down<H>(&mut self, hw: &H)
	where
		H: HwOps + ?Sized,
	{
		if self.state.is_up() {
			hw.pm_put();
		}
		self.state = LinkState::Down;
		self.flags.remove(NicFlags::STARTED);
	}
}

impl Default for LinkSupervisor {
	fn default() -> Self {
		Self::new()
	}
}
