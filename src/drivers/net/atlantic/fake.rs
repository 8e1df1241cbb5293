//! In-memory collaborators for unit tests.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use hermit_sync::SpinMutex;

use crate::drivers::net::atlantic::desc::HwTxDesc;
use crate::drivers::net::atlantic::hw::{
	DmaAddr, DmaMapper, Duplex, FlowControl, HwError, HwOps, LinkQuery, LinkStatus,
	MappingError, PtpLinkState, QueryError, TxStatus, TxWriteback,
};
use crate::drivers::net::atlantic::moderation::ItrSettings;

#[derive(Default)]
struct MapperState {
	next: u64,
	calls: usize,
	fail_on: Option<usize>,
	live: BTreeMap<u64, usize>,
	unmapped: Vec<(DmaAddr, usize)>,
}

/// Hands out fake bus addresses and checks that every mapping is released once.
pub struct FakeMapper(SpinMutex<MapperState>);

impl FakeMapper {
	pub fn new() -> Self {
		Self(SpinMutex::new(MapperState {
			next: 0x10_0000,
			..Default::default()
		}))
	}

	/// Lets the `n`-th call to `map` (counting from 1) fail.
	pub fn fail_on(&self, n: usize) {
		self.0.lock().fail_on = Some(n);
	}

	pub fn map_calls(&self) -> usize {
		self.0.lock().calls
	}

	pub fn live(&self) -> usize {
		self.0.lock().live.len()
	}

	pub fn unmapped_lens(&self) -> Vec<usize> {
		self.0.lock().unmapped.iter().map(|(_, len)| *len).collect()
	}
}

impl DmaMapper for FakeMapper {
	fn map(&self, region: &[u8]) -> Result<DmaAddr, MappingError> {
		let mut state = self.0.lock();
		state.calls += 1;
		if state.fail_on == Some(state.calls) {
			return Err(MappingError { len: region.len() });
		}

		let addr = state.next;
		state.next += (region.len() as u64).next_multiple_of(0x1000).max(0x1000);
		state.live.insert(addr, region.len());
		Ok(DmaAddr(addr))
	}

	fn unmap(&self, addr: DmaAddr, len: usize) {
		let mut state = self.0.lock();
		assert_eq!(state.live.remove(&addr.0), Some(len), "bad unmap of {addr:?}");
		state.unmapped.push((addr, len));
	}
}

pub struct FakeWriteback(TxStatus);

impl FakeWriteback {
	pub fn ok() -> Self {
		Self(TxStatus {
			ok: true,
			timestamp: None,
		})
	}

	pub fn with_timestamp(ts: u64) -> Self {
		Self(TxStatus {
			ok: true,
			timestamp: Some(ts),
		})
	}
}

impl TxWriteback for FakeWriteback {
	fn status(&self, _ring: u16, _index: u32) -> TxStatus {
		self.0
	}
}

/// Link query answering from a settable status.
pub struct FakeLink(SpinMutex<Result<LinkStatus, QueryError>>);

impl FakeLink {
	pub fn down() -> Self {
		Self(SpinMutex::new(Ok(LinkStatus::down())))
	}

	pub fn set_up(&self, mbps: u32, duplex: Duplex) {
		*self.0.lock() = Ok(LinkStatus {
			mbps,
			duplex,
			flow_control: FlowControl::RX | FlowControl::TX,
		});
	}

	pub fn set_down(&self) {
		*self.0.lock() = Ok(LinkStatus::down());
	}

	pub fn set_error(&self, err: QueryError) {
		*self.0.lock() = Err(err);
	}
}

impl LinkQuery for FakeLink {
	fn query(&self) -> Result<LinkStatus, QueryError> {
		*self.0.lock()
	}
}

#[derive(Default)]
pub struct HwLog {
	pub xmit: Vec<(u16, Vec<(u32, HwTxDesc)>, u32)>,
	pub started: Vec<u16>,
	pub stopped: Vec<u16>,
	pub itr: Vec<ItrSettings>,
	pub fc: Vec<FlowControl>,
	pub ptp: Vec<PtpLinkState>,
	pub ptp_offset: Vec<u32>,
	pub rate_limits: Vec<(Vec<u32>, Vec<u32>)>,
	pub pm_holds: i32,
	pub heads: BTreeMap<u16, u32>,
}

/// Records every hardware operation.
pub struct FakeHw {
	pub log: SpinMutex<HwLog>,
	pub clock: Option<u8>,
}

impl FakeHw {
	pub fn new() -> Self {
		Self {
			log: SpinMutex::new(HwLog::default()),
			clock: None,
		}
	}

	pub fn with_clock(clock: u8) -> Self {
		Self {
			clock: Some(clock),
			..Self::new()
		}
	}
}

impl HwOps for FakeHw {
	fn ring_tx_xmit(
		&self,
		ring: u16,
		descs: &[(u32, HwTxDesc)],
		tail: u32,
	) -> Result<(), HwError> {
		self.log.lock().xmit.push((ring, descs.to_vec(), tail));
		Ok(())
	}

	fn ring_tx_start(&self, ring: u16) -> Result<(), HwError> {
		self.log.lock().started.push(ring);
		Ok(())
	}

	fn ring_tx_stop(&self, ring: u16) -> Result<(), HwError> {
		self.log.lock().stopped.push(ring);
		Ok(())
	}

	fn ring_tx_head(&self, ring: u16) -> Result<u32, HwError> {
		self.log
			.lock()
			.heads
			.get(&ring)
			.copied()
			.ok_or(HwError::Timeout)
	}

	fn set_interrupt_moderation(&self, settings: &ItrSettings) -> Result<(), HwError> {
		self.log.lock().itr.push(*settings);
		Ok(())
	}

	fn set_flow_control(&self, fc: FlowControl) -> Result<(), HwError> {
		self.log.lock().fc.push(fc);
		Ok(())
	}

	fn ptp_clock_init(&self, state: PtpLinkState) {
		self.log.lock().ptp.push(state);
	}

	fn ptp_offset_set(&self, mbps: u32) {
		self.log.lock().ptp_offset.push(mbps);
	}

	fn clock_select(&self) -> Option<u8> {
		self.clock
	}

	fn tc_rate_limit_set(&self, max_rate: &[u32], min_rate: &[u32]) -> Result<(), HwError> {
		self.log
			.lock()
			.rate_limits
			.push((max_rate.to_vec(), min_rate.to_vec()));
		Ok(())
	}

	fn pm_get(&self) {
		self.log.lock().pm_holds += 1;
	}

	fn pm_put(&self) {
		self.log.lock().pm_holds -= 1;
	}
}

const ETH_SRC: [u8; 6] = [0x00, 0x17, 0xb6, 0x00, 0x00, 0x01];
const ETH_DST: [u8; 6] = [0x00, 0x17, 0xb6, 0x00, 0x00, 0x02];

fn eth(ethertype: u16) -> Vec<u8> {
	let mut frame = Vec::with_capacity(128);
	frame.extend_from_slice(&ETH_DST);
	frame.extend_from_slice(&ETH_SRC);
	frame.extend_from_slice(&ethertype.to_be_bytes());
	frame
}

/// Ethernet + IPv4 header (no options) followed by `l4`.
pub fn eth_ipv4(protocol: u8, l4: &[u8]) -> Vec<u8> {
	let mut frame = eth(0x0800);
	let total = (20 + l4.len()) as u16;
	frame.extend_from_slice(&[0x45, 0]);
	frame.extend_from_slice(&total.to_be_bytes());
	frame.extend_from_slice(&[0, 0, 0x40, 0, 64, protocol, 0, 0]);
	frame.extend_from_slice(&[10, 0, 0, 1, 10, 0, 0, 2]);
	frame.extend_from_slice(l4);
	frame
}

/// Ethernet + IPv6 header followed by `l4`.
pub fn eth_ipv6(next_header: u8, l4: &[u8]) -> Vec<u8> {
	let mut frame = eth(0x86dd);
	frame.extend_from_slice(&[0x60, 0, 0, 0]);
	frame.extend_from_slice(&(l4.len() as u16).to_be_bytes());
	frame.extend_from_slice(&[next_header, 64]);
	let mut addr = [0u8; 16];
	addr[0] = 0xfe;
	addr[1] = 0x80;
	addr[15] = 1;
	frame.extend_from_slice(&addr);
	addr[15] = 2;
	frame.extend_from_slice(&addr);
	frame.extend_from_slice(l4);
	frame
}

/// TCP header of `words` 32-bit words.
pub fn tcp_header(words: u8) -> Vec<u8> {
	let mut tcp = vec![0u8; usize::from(words) * 4];
	tcp[0..2].copy_from_slice(&1234u16.to_be_bytes());
	tcp[2..4].copy_from_slice(&80u16.to_be_bytes());
	tcp[12] = words << 4;
	tcp[13] = 0x18;
	tcp
}

/// UDP header with length field `len`.
pub fn udp_header(len: u16) -> Vec<u8> {
	let mut udp = vec![0u8; 8];
	udp[0..2].copy_from_slice(&5000u16.to_be_bytes());
	udp[2..4].copy_from_slice(&319u16.to_be_bytes());
	udp[4..6].copy_from_slice(&len.to_be_bytes());
	udp
}
