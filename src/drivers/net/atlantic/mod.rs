//! Transmit core of the Aquantia Atlantic network controllers (AQC1xx).
//!
//! [`AtlanticNic`] owns the per-device configuration, the hardware
//! collaborators and the datapath. The datapath (queue topology plus one
//! transmit ring per (tc, vector) pair) is immutable and replaced as a whole
//! whenever the queue layout changes.

pub mod desc;
#[cfg(test)]
mod fake;
pub mod hw;
pub mod link;
pub mod moderation;
pub mod ring;
pub mod segment;
pub mod topology;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use hermit_sync::{RwSpinLock, SpinMutex};

use self::error::{NicError, SubmitError, TxError};
use self::hw::{DmaMapper, FlowControl, HwCaps, HwFeatures, HwOps, LinkQuery, LinkSpeeds, QueryError, TxWriteback};
use self::link::{LinkEvent, LinkEvents, LinkPolicy, LinkState, LinkSupervisor, NicFlags, QueueControl};
use self::moderation::{ItrMode, ItrSettings};
use self::ring::{RingError, TxCompletion, TxRing};
use self::segment::{Segmenter, TxPacket};
use self::topology::{IrqBudget, IrqType, NegotiationInput, QueueTopology, default_prio_tc_map};
use crate::config::{
	POLLING_TIMER_INTERVAL, PTP_TC, RESTART_DESC_THRES, SERVICE_TIMER_INTERVAL, TC_MAX_RATE_MIN,
	TC_MIN_RATE_MIN, TCS_DEF, TCS_MAX, TX_FRAME_MAX, TXDS_DEF, RXDS_DEF,
};
use crate::drivers::{Driver, InterruptLine};
use crate::runtime_params::{DeviceOverride, NicConfig};

pub mod error {
	use thiserror::Error;

	use super::hw::HwError;
	use super::ring::RingError;
	use super::segment::{L4Proto, TxPacket};

	/// Reasons a packet cannot be described to the hardware.
	#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
	pub enum UnsupportedOffload {
		#[error("{0} fragments exceed the fragment limit")]
		TooManyFragments(usize),
		#[error("segmentation requested without L4 protocol")]
		MissingL4Proto,
		#[error("segmentation requested with a segment size of zero")]
		InvalidMss,
		#[error("packet headers could not be parsed")]
		MalformedHeader,
		#[error("header region of {len} bytes exceeds the descriptor limit of {limit}")]
		HeaderTooLong { len: usize, limit: usize },
		#[error("segmentation requested for {requested:?}, but the packet carries {found:?}")]
		L4Mismatch { requested: L4Proto, found: L4Proto },
		#[error("packet needs {required} descriptors, but the ring holds at most {limit}")]
		TooManyDescriptors { required: usize, limit: usize },
	}

	#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
	pub enum TxError {
		#[error("transmit ring is full")]
		RingFull,
		#[error("mapping packet data for device access failed")]
		MappingFailed,
		#[error("unsupported packet: {0}")]
		Unsupported(UnsupportedOffload),
		#[error("link is down")]
		LinkDown,
	}

	/// A rejected submission. The packet is handed back unchanged.
	#[derive(Error, Debug)]
	#[error("{reason}")]
	pub struct SubmitError {
		pub reason: TxError,
		pub packet: TxPacket,
	}

	impl SubmitError {
		pub fn new(reason: TxError, packet: TxPacket) -> Self {
			Self { reason, packet }
		}

		pub fn into_packet(self) -> TxPacket {
			self.packet
		}
	}

	#[derive(Error, Debug, Clone, PartialEq, Eq)]
	pub enum NicError {
		#[error("{0} traffic classes is not a power of two")]
		InvalidTcCount(u32),
		#[error("{requested} traffic classes requested, the device supports {max}")]
		TooManyTcs { requested: u32, max: u32 },
		#[error("priority map points to traffic class {0} which does not exist")]
		InvalidPrioMap(u8),
		#[error("traffic class {0} does not exist")]
		InvalidTc(u32),
		#[error("device is not initialized")]
		NotRunning,
		#[error("ring setup failed: {0}")]
		Ring(#[from] RingError),
		#[error("hardware operation failed: {0}")]
		Hw(#[from] HwError),
	}
}

/// Host resources available to one device.
#[derive(Debug, Clone)]
pub struct HostResources {
	/// Identity used to look up per-device parameters, e.g. the PCI address
	pub device: String,
	pub cpus: u32,
	/// Interrupt vectors allocated for the device
	pub irq_vectors: u32,
	pub irq_type: IrqType,
}

/// Runtime configuration of one device, derived from capabilities and parameters.
#[derive(Debug, Clone)]
pub struct NicCfg {
	pub caps: HwCaps,
	pub host: HostResources,
	pub txds: u32,
	pub rxds: u32,
	pub tcs: u32,
	pub is_qos: bool,
	pub is_ptp: bool,
	pub is_polling: bool,
	pub itr: ItrMode,
	pub link_speed_msk: LinkSpeeds,
	pub features: HwFeatures,
	pub is_vlan_tx_insert: bool,
	pub prio_tc_map: [u8; 8],
	pub explicit_prio_map: bool,
	pub tc_max_rate: [u32; TCS_MAX as usize],
	pub tc_min_rate: [u32; TCS_MAX as usize],
	pub tc_min_rate_msk: u8,
	pub fw: DeviceOverride,
	enable_ptp: bool,
}

impl NicCfg {
	/// Checks the hardware capabilities and corrects the configuration.
	pub fn start(caps: HwCaps, params: &NicConfig, host: HostResources) -> Self {
		let txds = caps
			.max_tx_descriptors
			.min(TXDS_DEF)
			.max(caps.min_tx_descriptors);
		let rxds = caps.max_rx_descriptors.min(RXDS_DEF);
		let fw = params
			.device_override(&host.device)
			.copied()
			.unwrap_or_default();

		Self {
			txds,
			rxds,
			tcs: TCS_DEF,
			is_qos: false,
			is_ptp: params.enable_ptp,
			is_polling: params.polling,
			itr: ItrMode::from_param(params.itr, params.itr_tx, params.itr_rx),
			link_speed_msk: LinkSpeeds::all() & caps.link_speeds,
			features: caps.features,
			is_vlan_tx_insert: caps.features.contains(HwFeatures::VLAN_CTAG_TX),
			prio_tc_map: default_prio_tc_map(TCS_DEF),
			explicit_prio_map: false,
			tc_max_rate: [0; TCS_MAX as usize],
			tc_min_rate: [0; TCS_MAX as usize],
			tc_min_rate_msk: 0,
			fw,
			enable_ptp: params.enable_ptp,
			caps,
			host,
		}
	}

	pub fn negotiation_input(&self) -> NegotiationInput {
		NegotiationInput {
			hw_max_vectors: self.caps.max_vectors,
			host_parallelism: self.host.cpus,
			irq: IrqBudget::from_allocated(self.host.irq_vectors),
			irq_type: self.host.irq_type,
			tcs: self.tcs,
			chip: self.caps.chip,
			rss_cap: self.caps.max_vectors,
			prio_tc_map: self.explicit_prio_map.then_some(self.prio_tc_map),
		}
	}
}

/// Snapshot of one transmit queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingState {
	pub hw_index: u16,
	pub head: u32,
	pub tail: u32,
	pub in_flight: u32,
	pub free: u32,
	pub stopped: bool,
}

pub struct TxQueue {
	ring: SpinMutex<TxRing>,
	hw_index: u16,
	stopped: AtomicBool,
	restart_thres: u32,
}

impl TxQueue {
	fn new(hw_index: u16, size: u32) -> Result<Self, RingError> {
		let ring = TxRing::new(hw_index, size)?;
		let restart_thres = RESTART_DESC_THRES.min((size - 1) / 2).max(1);

		Ok(Self {
			ring: SpinMutex::new(ring),
			hw_index,
			stopped: AtomicBool::new(true),
			restart_thres,
		})
	}

	pub fn hw_index(&self) -> u16 {
		self.hw_index
	}

	pub fn is_stopped(&self) -> bool {
		self.stopped.load(Ordering::Acquire)
	}

	fn stop(&self) {
		if !self.stopped.swap(true, Ordering::AcqRel) {
			trace!("Ring {}: queue stopped", self.hw_index);
		}
	}

	fn wake(&self) {
		if self.stopped.swap(false, Ordering::AcqRel) {
			trace!("Ring {}: queue woken", self.hw_index);
		}
	}

	pub fn state(&self) -> RingState {
		let ring = self.ring.lock();
		RingState {
			hw_index: self.hw_index,
			head: ring.head(),
			tail: ring.tail(),
			in_flight: ring.in_flight(),
			free: ring.free_slots(),
			stopped: self.is_stopped(),
		}
	}
}

/// Queue topology and the rings it describes.
pub struct Datapath {
	topology: QueueTopology,
	queues: Vec<Arc<TxQueue>>,
	segmenter: Segmenter,
}

impl Datapath {
	pub fn topology(&self) -> &QueueTopology {
		&self.topology
	}

	pub fn queues(&self) -> &[Arc<TxQueue>] {
		&self.queues
	}

	fn queue(&self, tc: u32, vec: u32) -> Option<&Arc<TxQueue>> {
		if tc >= self.topology.tcs() || vec >= self.topology.vecs() {
			return None;
		}
		self.queues
			.get((self.topology.tc_queue_offset(tc) + vec) as usize)
	}

	fn queue_by_ring(&self, ring: u16) -> Option<&Arc<TxQueue>> {
		self.queues.iter().find(|queue| queue.hw_index == ring)
	}
}

struct Carrier<'a> {
	gate: &'a AtomicBool,
	datapath: Option<&'a Datapath>,
}

impl QueueControl for Carrier<'_> {
	fn wake_all(&self) {
		self.gate.store(true, Ordering::Release);
		for queue in self.datapath.iter().flat_map(|dp| dp.queues.iter()) {
			queue.wake();
		}
	}

	fn disable_all(&self) {
		self.gate.store(false, Ordering::Release);
		for queue in self.datapath.iter().flat_map(|dp| dp.queues.iter()) {
			queue.stop();
		}
	}
}

struct Service {
	cfg: NicCfg,
	supervisor: LinkSupervisor,
	running: bool,
}

pub struct AtlanticNic<H, M, L> {
	hw: H,
	mapper: M,
	link: L,
	params: NicConfig,
	datapath: RwSpinLock<Option<Arc<Datapath>>>,
	gate: AtomicBool,
	service: SpinMutex<Service>,
	events: LinkEvents,
}

impl<H, M, L> AtlanticNic<H, M, L>
where
	H: HwOps,
	M: DmaMapper,
	L: LinkQuery,
{
	pub fn new(hw: H, mapper: M, link: L, caps: HwCaps, params: NicConfig, host: HostResources) -> Self {
		let cfg = NicCfg::start(caps, &params, host);

		Self {
			hw,
			mapper,
			link,
			params,
			datapath: RwSpinLock::new(None),
			gate: AtomicBool::new(false),
			service: SpinMutex::new(Service {
				cfg,
				supervisor: LinkSupervisor::new(),
				running: false,
			}),
			events: LinkEvents::new(),
		}
	}

	pub fn hw(&self) -> &H {
		&self.hw
	}

	pub fn mapper(&self) -> &M {
		&self.mapper
	}

	pub fn link(&self) -> &L {
		&self.link
	}

	pub fn cfg(&self) -> NicCfg {
		self.service.lock().cfg.clone()
	}

	pub fn datapath(&self) -> Option<Arc<Datapath>> {
		self.datapath.read().clone()
	}

	pub fn link_state(&self) -> LinkState {
		self.service.lock().supervisor.state()
	}

	pub fn flow_control(&self) -> FlowControl {
		self.service.lock().supervisor.flow_control()
	}

	pub fn flags(&self) -> NicFlags {
		self.service.lock().supervisor.flags()
	}

	pub fn is_running(&self) -> bool {
		self.service.lock().running
	}

	/// Whether the transmit gate is open.
	pub fn carrier_ok(&self) -> bool {
		self.gate.load(Ordering::Acquire)
	}

	pub fn ring_state(&self, ring: u16) -> Option<RingState> {
		let datapath = self.datapath()?;
		datapath.queue_by_ring(ring).map(|queue| queue.state())
	}

	/// Negotiates the queue layout and allocates the rings.
	pub fn init(&self) -> Result<Vec<TxCompletion>, NicError> {
		let service = self.service.lock();
		let mut aborted = Vec::new();
		self.rebuild_locked(&service, false, &mut aborted)?;

		if let Some(datapath) = self.datapath() {
			let topology = datapath.topology();
			infoheader!(" ATLANTIC TX ");
			infoentry!("Device", service.cfg.host.device.as_str());
			infoentry!("Vectors", topology.vecs());
			infoentry!("Traffic classes", "{} ({:?})", topology.tcs(), topology.tc_mode());
			infoentry!("RSS queues", topology.rss_queues());
			infoentry!("Tx descriptors", service.cfg.txds);
			infoentry!("Link IRQ vector", topology.link_irq_vec());
			infofooter!();
		}

		Ok(aborted)
	}

	/// Starts the hardware rings and looks at the link for the first time.
	pub fn start(&self) -> Result<(), NicError> {
		let mut service = self.service.lock();
		self.start_locked(&mut service)
	}

	/// Closes the transmit path and drops everything still in flight.
	pub fn stop(&self) -> Vec<TxCompletion> {
		let mut service = self.service.lock();
		let mut aborted = Vec::new();
		self.stop_locked(&mut service, &mut aborted);
		aborted
	}

	fn current(&self) -> Option<Arc<Datapath>> {
		self.datapath.read().clone()
	}

	fn build_datapath(
		&self,
		cfg: &NicCfg,
		old: Option<&Datapath>,
		aborted: &mut Vec<TxCompletion>,
	) -> Result<Datapath, NicError> {
		let topology = QueueTopology::negotiate(&cfg.negotiation_input());

		// rings of surviving (tc, vec) pairs are only kept if the vector count stays
		let reuse = old.filter(|old| old.topology.vecs() == topology.vecs());
		let mut queues = Vec::with_capacity(topology.queue_count() as usize);
		for (tc, vec, hw_index) in topology.rings() {
			let kept = reuse
				.and_then(|old| old.queue(tc, vec))
				.filter(|queue| queue.hw_index == hw_index && queue.ring.lock().capacity() == cfg.txds)
				.cloned();
			let queue = match kept {
				Some(queue) => queue,
				None => Arc::new(TxQueue::new(hw_index, cfg.txds)?),
			};
			queues.push(queue);
		}

		if let Some(old) = old {
			for queue in &old.queues {
				if !queues.iter().any(|new| Arc::ptr_eq(new, queue)) {
					queue
						.ring
						.lock()
						.drain(&self.mapper, &mut |completion| aborted.push(completion));
				}
			}
		}

		let segmenter = Segmenter {
			max_transfer: TX_FRAME_MAX.min(cfg.caps.max_transfer_size).max(1) as usize,
			vlan_insert: cfg.is_vlan_tx_insert,
			udp_len_fixup: cfg.caps.chip.contains(hw::ChipFeatures::UDP_GSO_LEN_FIXUP),
			clock_select: if cfg.is_ptp {
				self.hw.clock_select()
			} else {
				None
			},
		};

		Ok(Datapath {
			topology,
			queues,
			segmenter,
		})
	}

	fn rebuild_locked(
		&self,
		service: &Service,
		keep_rings: bool,
		aborted: &mut Vec<TxCompletion>,
	) -> Result<(), NicError> {
		let old = self.current();
		let reuse = if keep_rings { old.as_deref() } else { None };
		let datapath = self.build_datapath(&service.cfg, reuse, aborted)?;

		if !keep_rings && let Some(old) = old.as_deref() {
			for queue in &old.queues {
				queue
					.ring
					.lock()
					.drain(&self.mapper, &mut |completion| aborted.push(completion));
			}
		}

		*self.datapath.write() = Some(Arc::new(datapath));
		Ok(())
	}

	fn start_locked(&self, service: &mut Service) -> Result<(), NicError> {
		let datapath = self.current().ok_or(NicError::NotRunning)?;

		for queue in &datapath.queues {
			self.hw.ring_tx_start(queue.hw_index)?;
		}

		let itr = ItrSettings::compute(service.cfg.itr, service.supervisor.state().mbps());
		self.hw.set_interrupt_moderation(&itr)?;

		service.running = true;
		service.supervisor.clear_flags(NicFlags::STOPPING);
		debug!(
			"Started {} transmit rings, polling {}",
			datapath.queues.len(),
			service.cfg.is_polling
		);

		// the first link check happens right away instead of after one interval
		if let Err(err) = self.update_link_locked(service) {
			debug!("Initial link check failed: {err}");
		}

		Ok(())
	}

	fn stop_locked(&self, service: &mut Service, aborted: &mut Vec<TxCompletion>) {
		service.supervisor.set_flags(NicFlags::STOPPING);

		let datapath = self.current();
		Carrier {
			gate: &self.gate,
			datapath: datapath.as_deref(),
		}
		.disable_all();

		for queue in datapath.iter().flat_map(|dp| dp.queues.iter()) {
			if let Err(err) = self.hw.ring_tx_stop(queue.hw_index) {
				error!("Unable to stop ring {}: {err}", queue.hw_index);
			}
			queue
				.ring
				.lock()
				.drain(&self.mapper, &mut |completion| aborted.push(completion));
		}

		service.supervisor.force_down(&self.hw);
		service.running = false;
		service.supervisor.clear_flags(NicFlags::STOPPING);
	}

	fn update_link_locked(&self, service: &mut Service) -> Result<Option<LinkEvent>, QueryError> {
		let datapath = self.current();
		let carrier = Carrier {
			gate: &self.gate,
			datapath: datapath.as_deref(),
		};
		let policy = LinkPolicy {
			itr: service.cfg.itr,
			ptp: service.cfg.is_ptp,
			flow_control: service.cfg.caps.flow_control,
			tc_max_rate: &service.cfg.tc_max_rate,
			tc_min_rate: &service.cfg.tc_min_rate,
		};

		service
			.supervisor
			.update(&self.link, &self.hw, &carrier, &self.events, &policy)
	}

	/// Hands `packet` to the hardware.
	///
	/// The queue is selected by `queue_key` (flow hash or queue id) and the
	/// traffic class `priority` maps to. Returns the number of descriptors
	/// used.
	pub fn xmit(&self, packet: TxPacket, queue_key: u32, priority: u8) -> Result<usize, SubmitError> {
		if !self.gate.load(Ordering::Acquire) {
			return Err(SubmitError::new(TxError::LinkDown, packet));
		}
		let Some(datapath) = self.current() else {
			return Err(SubmitError::new(TxError::LinkDown, packet));
		};

		let (tc, vec) = datapath.topology.select(queue_key, priority);
		let Some(queue) = datapath.queue(tc, vec) else {
			error!("No queue for tc {tc} vec {vec}");
			return Err(SubmitError::new(TxError::LinkDown, packet));
		};

		if queue.is_stopped() {
			return Err(SubmitError::new(TxError::RingFull, packet));
		}

		let mut ring = queue.ring.lock();
		let start = ring.tail();
		match datapath.segmenter.map_packet(&mut ring, packet, &self.mapper) {
			Ok(count) => {
				let descs = desc::encode(&ring, start, count as u32);
				if let Err(err) = self.hw.ring_tx_xmit(ring.idx(), &descs, ring.tail()) {
					error!("Ring {}: handing descriptors to hardware failed: {err}", ring.idx());
				}
				Ok(count)
			}
			Err(err) => {
				if err.reason == TxError::RingFull {
					queue.stop();
				}
				Err(err)
			}
		}
	}

	fn complete_queue<W>(
		&self,
		queue: &TxQueue,
		completed: u32,
		writeback: &W,
		on_complete: &mut dyn FnMut(TxCompletion),
	) -> u32
	where
		W: TxWriteback + ?Sized,
	{
		let mut ring = queue.ring.lock();
		let retired = ring.retire_through(completed, &self.mapper, writeback, on_complete);

		if retired > 0
			&& queue.is_stopped()
			&& self.gate.load(Ordering::Acquire)
			&& ring.free_slots() >= queue.restart_thres
		{
			queue.wake();
		}

		retired
	}

	/// Retires descriptors of hardware ring `ring` up to and including `completed`.
	pub fn complete_tx<W>(
		&self,
		ring: u16,
		completed: u32,
		writeback: &W,
		on_complete: &mut dyn FnMut(TxCompletion),
	) -> u32
	where
		W: TxWriteback + ?Sized,
	{
		let Some(datapath) = self.current() else {
			return 0;
		};
		let Some(queue) = datapath.queue_by_ring(ring) else {
			warn!("Completion for unknown ring {ring}");
			return 0;
		};

		self.complete_queue(queue, completed, writeback, on_complete)
	}

	/// Periodic link check. Does nothing while the device is not ready.
	pub fn service_task(&self) -> Result<(), QueryError> {
		let mut service = self.service.lock();
		if !service.running || !service.supervisor.is_ready() {
			return Ok(());
		}

		self.update_link_locked(&mut service).map(|_| ())
	}

	/// Handler of the link-state interrupt.
	pub fn link_irq(&self) -> Result<(), QueryError> {
		let mut service = self.service.lock();
		if !service.running {
			return Ok(());
		}

		self.update_link_locked(&mut service).map(|_| ())
	}

	/// Service timer callback. Returns the delay until the next tick.
	pub fn on_service_timer(&self) -> Duration {
		// failures are already reported and retried on the next tick
		let _result = self.service_task();
		SERVICE_TIMER_INTERVAL
	}

	/// Polling timer callback, retiring whatever the hardware has processed.
	///
	/// Returns the delay until the next tick, `None` if the device uses
	/// interrupts.
	pub fn on_polling_timer<W>(&self, writeback: &W, on_complete: &mut dyn FnMut(TxCompletion)) -> Option<Duration>
	where
		W: TxWriteback + ?Sized,
	{
		if !self.service.lock().cfg.is_polling {
			return None;
		}

		if let Some(datapath) = self.current() {
			for queue in &datapath.queues {
				let (head, capacity) = {
					let ring = queue.ring.lock();
					if ring.is_empty() {
						continue;
					}
					(ring.head(), ring.capacity())
				};

				match self.hw.ring_tx_head(queue.hw_index) {
					Ok(hw_head) if hw_head != head && hw_head < capacity => {
						let completed = if hw_head == 0 { capacity - 1 } else { hw_head - 1 };
						self.complete_queue(queue, completed, writeback, on_complete);
					}
					Ok(_) => {}
					Err(err) => warn!("Ring {}: unable to read head: {err}", queue.hw_index),
				}
			}
		}

		Some(POLLING_TIMER_INTERVAL)
	}

	/// Changes the number of traffic classes.
	///
	/// A running device is stopped and restarted around the change. Packets
	/// dropped on the way are returned as aborted completions.
	pub fn setup_tc(&self, tcs: u32, prio_tc_map: Option<[u8; 8]>) -> Result<Vec<TxCompletion>, NicError> {
		let mut service = self.service.lock();
		debug!("tcs = {tcs}");

		if tcs == service.cfg.tcs || (tcs == 0 && !service.cfg.is_qos) {
			return Ok(Vec::new());
		}

		let max = service.cfg.caps.tcs_max.min(TCS_MAX);
		if tcs > max {
			return Err(NicError::TooManyTcs {
				requested: tcs,
				max,
			});
		}
		if tcs != 0 && !tcs.is_power_of_two() {
			return Err(NicError::InvalidTcCount(tcs));
		}

		let new_tcs = tcs.max(1);
		if let Some(map) = prio_tc_map
			&& let Some(&bad) = map.iter().find(|&&tc| u32::from(tc) >= new_tcs)
		{
			return Err(NicError::InvalidPrioMap(bad));
		}

		self.hw.pm_get();

		let mut aborted = Vec::new();
		let was_running = service.running;
		if was_running {
			self.stop_locked(&mut service, &mut aborted);
		}

		let prev_vecs = self.current().map(|dp| dp.topology.vecs());
		let cfg = &mut service.cfg;
		cfg.tcs = new_tcs;
		cfg.prio_tc_map = prio_tc_map.unwrap_or_else(|| default_prio_tc_map(new_tcs));
		cfg.explicit_prio_map = prio_tc_map.is_some();
		cfg.is_qos = tcs != 0;
		cfg.is_ptp = self.params.enable_ptp && new_tcs > PTP_TC;

		let mut result = Ok(());
		if prev_vecs.is_some() {
			result = self.rebuild_locked(&service, true, &mut aborted);
			if let Some(datapath) = self.current() {
				info!(
					"Traffic classes now {}, vectors {} (before {:?})",
					new_tcs,
					datapath.topology.vecs(),
					prev_vecs
				);
			}
		}
		if result.is_ok() && was_running {
			result = self.start_locked(&mut service);
		}

		self.hw.pm_put();
		result.map(|()| aborted)
	}

	pub fn setup_tc_max_rate(&self, tc: u32, max_rate: u32) -> Result<(), NicError> {
		debug!("tc = {tc} max_rate = {max_rate}");
		if tc >= TCS_MAX {
			return Err(NicError::InvalidTc(tc));
		}

		let rate = if max_rate != 0 && max_rate < TC_MAX_RATE_MIN {
			warn!("Setting max rate to the minimum usable value of {TC_MAX_RATE_MIN}Mbps.");
			TC_MAX_RATE_MIN
		} else {
			max_rate
		};
		self.service.lock().cfg.tc_max_rate[tc as usize] = rate;
		Ok(())
	}

	pub fn setup_tc_min_rate(&self, tc: u32, min_rate: u32) -> Result<(), NicError> {
		debug!("tc = {tc} min_rate = {min_rate}");
		if tc >= TCS_MAX {
			return Err(NicError::InvalidTc(tc));
		}

		let rate = if min_rate != 0 && min_rate < TC_MIN_RATE_MIN {
			warn!("Setting min rate to the minimum usable value of {TC_MIN_RATE_MIN}Mbps.");
			TC_MIN_RATE_MIN
		} else {
			min_rate
		};

		let mut service = self.service.lock();
		let cfg = &mut service.cfg;
		if min_rate != 0 {
			cfg.tc_min_rate_msk |= 1 << tc;
		} else {
			cfg.tc_min_rate_msk &= !(1 << tc);
		}
		cfg.tc_min_rate[tc as usize] = rate;
		Ok(())
	}

	/// Takes all link events posted since the last call.
	pub fn drain_link_events(&self) -> Vec<LinkEvent> {
		self.events.drain()
	}
}

impl<H, M, L> Driver for AtlanticNic<H, M, L>
where
	H: HwOps,
	M: DmaMapper,
	L: LinkQuery,
{
	fn get_interrupt_number(&self) -> InterruptLine {
		self.current()
			.and_then(|dp| InterruptLine::try_from(dp.topology.link_irq_vec()).ok())
			.unwrap_or(0)
	}

	fn get_name(&self) -> &'static str {
		"atlantic"
	}
}
