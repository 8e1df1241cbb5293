//! Interfaces to the hardware-abstraction collaborators of the transmit core.
//!
//! The core never talks to registers or firmware directly. It only sees a
//! capability descriptor ([`HwCaps`]), a buffer-mapping service
//! ([`DmaMapper`]), a link-status query ([`LinkQuery`]), the completion
//! write-back of the hardware ([`TxWriteback`]) and the chip-family operation
//! set ([`HwOps`]).

use core::fmt;

use thiserror::Error;

use crate::drivers::net::atlantic::desc::HwTxDesc;
use crate::drivers::net::atlantic::moderation::ItrSettings;

/// Bus address of a region mapped for device access.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DmaAddr(pub u64);

impl fmt::Debug for DmaAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "DmaAddr({:#x})", self.0)
	}
}

impl From<DmaAddr> for u64 {
	fn from(addr: DmaAddr) -> Self {
		addr.0
	}
}

/// Mapping a region for device access failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("mapping of {len} bytes for device access failed")]
pub struct MappingError {
	pub len: usize,
}

/// Buffer-mapping service (DMA API / IOMMU).
///
/// `unmap` is called exactly once for every successful `map`.
pub trait DmaMapper {
	fn map(&self, region: &[u8]) -> Result<DmaAddr, MappingError>;

	fn unmap(&self, addr: DmaAddr, len: usize);
}

bitflags! {
	/// Link rates, bit-compatible with the firmware rate mask.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct LinkSpeeds: u32 {
		const RATE_10G = 1 << 0;
		const RATE_5G = 1 << 1;
		const RATE_5GSR = 1 << 2;
		const RATE_2G5 = 1 << 3;
		const RATE_1G = 1 << 4;
		const RATE_100M = 1 << 5;
		const RATE_10M = 1 << 6;
		const RATE_1G_HALF = 1 << 7;
		const RATE_100M_HALF = 1 << 8;
		const RATE_10M_HALF = 1 << 9;
	}
}

bitflags! {
	/// Pause frame directions.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct FlowControl: u32 {
		const RX = 1 << 0;
		const TX = 1 << 1;
	}
}

bitflags! {
	/// Offload features the hardware provides.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct HwFeatures: u32 {
		const HW_CSUM = 1 << 0;
		const SG = 1 << 1;
		const TSO = 1 << 2;
		const TSO6 = 1 << 3;
		const GSO_UDP_L4 = 1 << 4;
		const VLAN_CTAG_TX = 1 << 5;
		const VLAN_CTAG_RX = 1 << 6;
		const RXHASH = 1 << 7;
	}
}

bitflags! {
	/// Chip family and revision bits.
	///
	/// The transmit core only branches on these bits, never on a concrete chip type.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct ChipFeatures: u32 {
		const MIPS = 1 << 0;
		const TPO2 = 1 << 1;
		const RPF2 = 1 << 2;
		const MPI_AQ = 1 << 3;
		const ATLANTIC = 1 << 4;
		const REVISION_A0 = 1 << 5;
		const REVISION_B0 = 1 << 6;
		const REVISION_B1 = 1 << 7;
		const ANTIGUA = 1 << 8;
		/// UDP segmentation does not rewrite the UDP length per segment.
		const UDP_GSO_LEN_FIXUP = 1 << 9;
	}
}

/// Capability descriptor queried once per negotiation.
#[derive(Debug, Clone)]
pub struct HwCaps {
	pub max_vectors: u32,
	pub tcs_max: u32,
	pub max_tx_descriptors: u32,
	pub max_rx_descriptors: u32,
	pub min_tx_descriptors: u32,
	/// Largest buffer a single data descriptor may point to.
	pub max_transfer_size: u32,
	pub link_speeds: LinkSpeeds,
	pub flow_control: bool,
	pub features: HwFeatures,
	pub chip: ChipFeatures,
}

impl HwCaps {
	/// Atlantic 1 (AQC107/108/109, revision B0/B1).
	pub fn atlantic_b0() -> Self {
		Self {
			max_vectors: 8,
			tcs_max: 8,
			max_tx_descriptors: 8184,
			max_rx_descriptors: 8184,
			min_tx_descriptors: 32,
			max_transfer_size: 16 * 1024,
			link_speeds: LinkSpeeds::RATE_10G
				| LinkSpeeds::RATE_5G
				| LinkSpeeds::RATE_2G5
				| LinkSpeeds::RATE_1G
				| LinkSpeeds::RATE_100M,
			flow_control: true,
			features: HwFeatures::HW_CSUM
				| HwFeatures::SG
				| HwFeatures::TSO
				| HwFeatures::TSO6
				| HwFeatures::GSO_UDP_L4
				| HwFeatures::VLAN_CTAG_TX
				| HwFeatures::VLAN_CTAG_RX
				| HwFeatures::RXHASH,
			chip: ChipFeatures::ATLANTIC
				| ChipFeatures::REVISION_B0
				| ChipFeatures::MIPS
				| ChipFeatures::TPO2
				| ChipFeatures::RPF2
				| ChipFeatures::UDP_GSO_LEN_FIXUP,
		}
	}

	/// Atlantic 2 (AQC113 family).
	pub fn antigua() -> Self {
		Self {
			link_speeds: LinkSpeeds::RATE_10G
				| LinkSpeeds::RATE_5G
				| LinkSpeeds::RATE_2G5
				| LinkSpeeds::RATE_1G
				| LinkSpeeds::RATE_1G_HALF
				| LinkSpeeds::RATE_100M
				| LinkSpeeds::RATE_100M_HALF
				| LinkSpeeds::RATE_10M
				| LinkSpeeds::RATE_10M_HALF,
			chip: ChipFeatures::ANTIGUA | ChipFeatures::UDP_GSO_LEN_FIXUP,
			..Self::atlantic_b0()
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Duplex {
	Half,
	Full,
}

/// Result of a link-status query. `mbps == 0` means the link is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
	pub mbps: u32,
	pub duplex: Duplex,
	pub flow_control: FlowControl,
}

impl LinkStatus {
	pub const fn down() -> Self {
		Self {
			mbps: 0,
			duplex: Duplex::Half,
			flow_control: FlowControl::empty(),
		}
	}
}

/// The link-status query failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
	#[error("firmware did not answer the link status request")]
	Timeout,
	#[error("firmware reported error {0:#x}")]
	Firmware(u32),
}

/// Link-status query offered by the firmware collaborator.
pub trait LinkQuery {
	fn query(&self) -> Result<LinkStatus, QueryError>;
}

/// Hardware completion status of a retired packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStatus {
	pub ok: bool,
	pub timestamp: Option<u64>,
}

impl TxStatus {
	pub const ABORTED: Self = Self {
		ok: false,
		timestamp: None,
	};
}

/// Descriptor write-back of the hardware, read by the completion path.
pub trait TxWriteback {
	/// Status written back for the end-of-packet descriptor `index` of `ring`.
	fn status(&self, ring: u16, index: u32) -> TxStatus;
}

/// A hardware operation failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
	#[error("operation not supported by this chip family")]
	NotSupported,
	#[error("hardware did not respond")]
	Timeout,
	#[error("hardware reported error {0}")]
	Code(i32),
}

/// State handed to the PTP clock on link changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtpLinkState {
	NoLink,
	LinkUp,
}

/// Chip-family operation set.
///
/// Every chip generation implements this trait. Operations a generation does
/// not provide keep their default implementation.
pub trait HwOps {
	/// Hands freshly committed descriptors to the hardware and moves the tail pointer.
	fn ring_tx_xmit(
		&self,
		ring: u16,
		descs: &[(u32, HwTxDesc)],
		tail: u32,
	) -> Result<(), HwError>;

	fn ring_tx_start(&self, ring: u16) -> Result<(), HwError>;

	fn ring_tx_stop(&self, ring: u16) -> Result<(), HwError>;

	/// Index of the next descriptor the hardware will process.
	fn ring_tx_head(&self, ring: u16) -> Result<u32, HwError>;

	fn set_interrupt_moderation(&self, settings: &ItrSettings) -> Result<(), HwError>;

	/// Applies negotiated flow control to the receive block.
	fn set_flow_control(&self, _fc: FlowControl) -> Result<(), HwError> {
		Err(HwError::NotSupported)
	}

	fn ptp_clock_init(&self, _state: PtpLinkState) {}

	fn ptp_offset_set(&self, _mbps: u32) {}

	/// Clock selector for timestamp requests, `None` without PTP support.
	fn clock_select(&self) -> Option<u8> {
		None
	}

	fn tc_rate_limit_set(&self, _max_rate: &[u32], _min_rate: &[u32]) -> Result<(), HwError> {
		Err(HwError::NotSupported)
	}

	/// Takes the runtime power-management hold.
	fn pm_get(&self) {}

	/// Releases the runtime power-management hold.
	fn pm_put(&self) {}
}
