//! Splits one outbound packet into ring descriptors.
//!
//! A packet occupies an optional context descriptor, one descriptor for the
//! header region and one descriptor per fragment chunk. Either every
//! descriptor of the packet is committed or none is.

use alloc::vec::Vec;

use smallvec::SmallVec;
use smoltcp::wire::{
	ETHERNET_HEADER_LEN, EthernetFrame, EthernetProtocol, IPV6_HEADER_LEN, IpProtocol,
	Ipv4Packet, Ipv6Packet, TcpPacket, UDP_HEADER_LEN, UdpPacket,
};

use crate::config::SKB_FRAGS_MAX;
use crate::drivers::net::atlantic::error::{SubmitError, TxError, UnsupportedOffload};
use crate::drivers::net::atlantic::hw::{DmaAddr, DmaMapper};
use crate::drivers::net::atlantic::ring::{CsumFlags, GsoParams, TxBuff, TxFlags, TxRing};

const IPV4_MIN_HEADER_LEN: usize = 20;
const TCP_MIN_HEADER_LEN: usize = 20;
const VLAN_TAG_LEN: usize = 4;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum L4Proto {
	#[default]
	None,
	Tcp,
	Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpVersion {
	#[default]
	V4,
	V6,
}

/// What the caller asks the hardware to do with the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffloadRequest {
	pub gso: bool,
	pub mss: u16,
	pub l4: L4Proto,
}

/// Packet handed to [`xmit`](super::AtlanticNic::xmit).
///
/// The header region holds the Ethernet, IP and L4 headers and possibly the
/// start of the payload. The packet is owned by the ring from the moment it
/// is accepted until its completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxPacket {
	pub header: Vec<u8>,
	pub frags: Vec<Vec<u8>>,
	pub offload: OffloadRequest,
	pub vlan_tag: Option<u16>,
	pub csum_offload: bool,
	pub ip_version: IpVersion,
	pub request_timestamp: bool,
}

impl TxPacket {
	pub fn new(header: Vec<u8>) -> Self {
		Self {
			header,
			..Default::default()
		}
	}

	pub fn with_frag(mut self, frag: Vec<u8>) -> Self {
		self.frags.push(frag);
		self
	}

	pub fn with_gso(mut self, l4: L4Proto, mss: u16) -> Self {
		self.offload = OffloadRequest { gso: true, mss, l4 };
		self
	}

	pub fn with_vlan(mut self, tag: u16) -> Self {
		self.vlan_tag = Some(tag);
		self
	}

	pub fn with_csum_offload(mut self) -> Self {
		self.csum_offload = true;
		self
	}

	pub fn with_ip_version(mut self, version: IpVersion) -> Self {
		self.ip_version = version;
		self
	}

	pub fn with_timestamp(mut self) -> Self {
		self.request_timestamp = true;
		self
	}

	/// Total length of header region and fragments.
	pub fn len(&self) -> usize {
		self.header.len() + self.frags.iter().map(Vec::len).sum::<usize>()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Parsed header lengths of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
	/// Ethernet header length including an in-band VLAN tag
	pub len_l2: u8,
	pub ip_version: IpVersion,
	pub len_l3: u16,
	pub l4: L4Proto,
	/// Zero if the L4 header is unknown or not contained in the header region
	pub len_l4: u16,
}

impl HeaderInfo {
	pub fn l4_offset(&self) -> usize {
		usize::from(self.len_l2) + usize::from(self.len_l3)
	}

	/// Parses the Ethernet, IP and L4 headers at the start of `header`.
	///
	/// A single 802.1Q or 802.1ad tag between Ethernet and IP header is skipped.
	pub fn parse(header: &[u8]) -> Option<Self> {
		let frame = EthernetFrame::new_checked(header).ok()?;
		let mut payload = frame.payload();
		let mut ethertype = frame.ethertype();
		let mut len_l2 = ETHERNET_HEADER_LEN;

		if let EthernetProtocol::Unknown(ETHERTYPE_VLAN | ETHERTYPE_QINQ) = ethertype {
			if payload.len() < VLAN_TAG_LEN {
				return None;
			}
			ethertype = EthernetProtocol::from(u16::from_be_bytes([payload[2], payload[3]]));
			payload = &payload[VLAN_TAG_LEN..];
			len_l2 += VLAN_TAG_LEN;
		}

		let (ip_version, len_l3, protocol) = match ethertype {
			EthernetProtocol::Ipv4 => {
				if payload.len() < IPV4_MIN_HEADER_LEN {
					return None;
				}
				let packet = Ipv4Packet::new_unchecked(payload);
				let len = usize::from(packet.header_len());
				if len < IPV4_MIN_HEADER_LEN || payload.len() < len {
					return None;
				}
				(IpVersion::V4, len, packet.next_header())
			}
			EthernetProtocol::Ipv6 => {
				if payload.len() < IPV6_HEADER_LEN {
					return None;
				}
				let packet = Ipv6Packet::new_unchecked(payload);
				(IpVersion::V6, IPV6_HEADER_LEN, packet.next_header())
			}
			_ => return None,
		};

		let l4 = &payload[len_l3..];
		let (l4_proto, len_l4) = match protocol {
			IpProtocol::Tcp if l4.len() >= TCP_MIN_HEADER_LEN => {
				let tcp = TcpPacket::new_unchecked(l4);
				let len = usize::from(tcp.header_len());
				if len < TCP_MIN_HEADER_LEN || l4.len() < len {
					(L4Proto::Tcp, 0)
				} else {
					(L4Proto::Tcp, len)
				}
			}
			IpProtocol::Tcp => (L4Proto::Tcp, 0),
			IpProtocol::Udp if l4.len() >= UDP_HEADER_LEN => (L4Proto::Udp, UDP_HEADER_LEN),
			IpProtocol::Udp => (L4Proto::Udp, 0),
			_ => (L4Proto::None, 0),
		};

		Some(Self {
			len_l2: u8::try_from(len_l2).ok()?,
			ip_version,
			len_l3: u16::try_from(len_l3).ok()?,
			l4: l4_proto,
			len_l4: u16::try_from(len_l4).ok()?,
		})
	}
}

/// Per-device parameters of the mapping step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
	/// Largest region a single data descriptor may point to
	pub max_transfer: usize,
	/// Hardware VLAN tag insertion is enabled
	pub vlan_insert: bool,
	/// The hardware does not rewrite the UDP length field per segment
	pub udp_len_fixup: bool,
	/// PTP clock selector, `None` if timestamping is unavailable
	pub clock_select: Option<u8>,
}

/// State of one mapping attempt, needed to undo it.
struct Pending {
	written: SmallVec<[u32; 8]>,
	mapped: SmallVec<[(DmaAddr, usize); 8]>,
	udp_len: Option<(usize, u16)>,
}

impl Segmenter {
	/// Number of descriptors `packet` occupies.
	pub fn descriptors_needed(&self, packet: &TxPacket) -> usize {
		let max = self.max_transfer.max(1);
		let ctx = usize::from(self.needs_context(packet));
		let chunks: usize = packet.frags.iter().map(|f| f.len().div_ceil(max)).sum();
		ctx + 1 + chunks
	}

	fn needs_context(&self, packet: &TxPacket) -> bool {
		packet.offload.gso || (self.vlan_insert && packet.vlan_tag.is_some())
	}

	fn check(&self, packet: &TxPacket, info: Option<&HeaderInfo>) -> Result<(), UnsupportedOffload> {
		if packet.frags.len() + 1 > SKB_FRAGS_MAX {
			return Err(UnsupportedOffload::TooManyFragments(packet.frags.len()));
		}
		if packet.header.is_empty() {
			return Err(UnsupportedOffload::MalformedHeader);
		}
		let limit = self.max_transfer.max(1);
		if packet.header.len() > limit {
			return Err(UnsupportedOffload::HeaderTooLong {
				len: packet.header.len(),
				limit,
			});
		}
		// the hardware cannot fill a checksum it cannot locate
		if packet.csum_offload && info.is_none() {
			return Err(UnsupportedOffload::MalformedHeader);
		}

		if packet.offload.gso {
			if packet.offload.l4 == L4Proto::None {
				return Err(UnsupportedOffload::MissingL4Proto);
			}
			if packet.offload.mss == 0 {
				return Err(UnsupportedOffload::InvalidMss);
			}
			let info = info.ok_or(UnsupportedOffload::MalformedHeader)?;
			if info.len_l4 == 0 {
				return Err(UnsupportedOffload::MalformedHeader);
			}
			if info.l4 != packet.offload.l4 {
				return Err(UnsupportedOffload::L4Mismatch {
					requested: packet.offload.l4,
					found: info.l4,
				});
			}
		}

		Ok(())
	}

	/// Maps `packet` into `ring` starting at the current tail.
	///
	/// Returns the number of committed descriptors. On failure the ring is
	/// left exactly as it was and the packet is handed back.
	pub fn map_packet<M>(
		&self,
		ring: &mut TxRing,
		mut packet: TxPacket,
		mapper: &M,
	) -> Result<usize, SubmitError>
	where
		M: DmaMapper + ?Sized,
	{
		let info = HeaderInfo::parse(&packet.header);
		if let Err(err) = self.check(&packet, info.as_ref()) {
			debug!("Ring {}: rejecting packet: {err}", ring.idx());
			return Err(SubmitError::new(TxError::Unsupported(err), packet));
		}

		let required = self.descriptors_needed(&packet);
		let limit = ring.capacity() as usize - 1;
		if required > limit {
			let err = UnsupportedOffload::TooManyDescriptors { required, limit };
			debug!("Ring {}: rejecting packet: {err}", ring.idx());
			return Err(SubmitError::new(TxError::Unsupported(err), packet));
		}
		if (ring.free_slots() as usize) < required {
			return Err(SubmitError::new(TxError::RingFull, packet));
		}

		let mut pending = Pending {
			written: SmallVec::new(),
			mapped: SmallVec::new(),
			udp_len: None,
		};

		match self.fill(ring, &mut packet, info, mapper, &mut pending) {
			Ok(()) => {}
			Err(reason) => {
				Self::rollback(ring, &mut packet, mapper, &pending);
				return Err(SubmitError::new(reason, packet));
			}
		}

		let count = pending.written.len();
		let sop = pending.written[usize::from(self.needs_context(&packet))];
		let eop = pending.written[count - 1];

		if let Err(err) = ring.commit(count as u32) {
			error!("Ring {}: commit of {count} descriptors failed: {err}", ring.idx());
			Self::rollback(ring, &mut packet, mapper, &pending);
			return Err(SubmitError::new(TxError::RingFull, packet));
		}

		trace!(
			"Ring {}: mapped packet of {} bytes into {count} descriptors ({sop}..={eop})",
			ring.idx(),
			packet.len()
		);
		ring.buff_mut(eop).packet = Some(packet);

		Ok(count)
	}

	fn fill<M>(
		&self,
		ring: &mut TxRing,
		packet: &mut TxPacket,
		info: Option<HeaderInfo>,
		mapper: &M,
		pending: &mut Pending,
	) -> Result<(), TxError>
	where
		M: DmaMapper + ?Sized,
	{
		let len_pkt = u32::try_from(packet.len())
			.map_err(|_| TxError::Unsupported(UnsupportedOffload::MalformedHeader))?;
		let mut dx = ring.tail();

		if self.needs_context(packet) {
			let mut ctx = TxBuff {
				flags: TxFlags::CONTEXT,
				len_pkt,
				..Default::default()
			};

			if packet.offload.gso
				&& let Some(info) = info
			{
				ctx.gso = GsoParams {
					mss: packet.offload.mss,
					len_l2: info.len_l2,
					len_l3: info.len_l3,
					len_l4: info.len_l4,
					is_ipv6: info.ip_version == IpVersion::V6,
				};
				match info.l4 {
					L4Proto::Tcp => ctx.flags |= TxFlags::GSO_TCP,
					L4Proto::Udp => {
						ctx.flags |= TxFlags::GSO_UDP;
						if self.udp_len_fixup {
							pending.udp_len =
								Some(rewrite_udp_len(&mut packet.header, &info, packet.offload.mss));
						}
					}
					L4Proto::None => {}
				}
			}

			if self.vlan_insert
				&& let Some(tag) = packet.vlan_tag
			{
				ctx.flags |= TxFlags::VLAN;
				ctx.vlan_tx_tag = tag;
			}

			*ring.buff_mut(dx) = ctx;
			pending.written.push(dx);
			dx = ring.next_dx(dx);
		}

		let csum = match info {
			Some(info) if packet.csum_offload => {
				let mut csum = CsumFlags::empty();
				if packet.ip_version == IpVersion::V4 {
					csum |= CsumFlags::IP;
				}
				match info.l4 {
					L4Proto::Tcp => csum |= CsumFlags::TCP,
					L4Proto::Udp => csum |= CsumFlags::UDP,
					L4Proto::None => {}
				}
				csum
			}
			_ => CsumFlags::empty(),
		};

		let pa = Self::map_region(mapper, &packet.header, pending)?;
		let sop = dx;
		*ring.buff_mut(dx) = TxBuff {
			pa: Some(pa),
			len: packet.header.len() as u32,
			flags: TxFlags::SOP | TxFlags::MAPPED,
			csum,
			len_pkt,
			..Default::default()
		};
		pending.written.push(dx);

		let max = self.max_transfer.max(1);
		for chunk in packet.frags.iter().flat_map(|frag| frag.chunks(max)) {
			dx = ring.next_dx(dx);
			let pa = Self::map_region(mapper, chunk, pending)?;
			*ring.buff_mut(dx) = TxBuff {
				pa: Some(pa),
				len: chunk.len() as u32,
				flags: TxFlags::MAPPED,
				csum,
				..Default::default()
			};
			pending.written.push(dx);
		}

		let eop = dx;
		ring.buff_mut(sop).eop_index = Some(eop);
		let last = ring.buff_mut(eop);
		last.flags |= TxFlags::EOP;
		last.sop_index = Some(sop);
		if packet.request_timestamp
			&& let Some(clk_sel) = self.clock_select
		{
			last.flags |= TxFlags::REQUEST_TS;
			last.clk_sel = clk_sel;
		}

		Ok(())
	}

	fn map_region<M>(mapper: &M, region: &[u8], pending: &mut Pending) -> Result<DmaAddr, TxError>
	where
		M: DmaMapper + ?Sized,
	{
		match mapper.map(region) {
			Ok(pa) => {
				pending.mapped.push((pa, region.len()));
				Ok(pa)
			}
			Err(err) => {
				warn!("{err}");
				Err(TxError::MappingFailed)
			}
		}
	}

	fn rollback<M>(ring: &mut TxRing, packet: &mut TxPacket, mapper: &M, pending: &Pending)
	where
		M: DmaMapper + ?Sized,
	{
		for &(pa, len) in pending.mapped.iter().rev() {
			mapper.unmap(pa, len);
		}
		for &dx in &pending.written {
			*ring.buff_mut(dx) = TxBuff::default();
		}
		if let Some((offset, len)) = pending.udp_len {
			packet.header[offset..offset + 2].copy_from_slice(&len.to_be_bytes());
		}

		debug!(
			"Ring {}: rolled back {} descriptors, {} mappings",
			ring.idx(),
			pending.written.len(),
			pending.mapped.len()
		);
	}
}

/// Sets the UDP length field to the length of one segment.
///
/// The hardware replicates the header for every segment without adjusting
/// this field. Returns offset and previous value of the field.
fn rewrite_udp_len(header: &mut [u8], info: &HeaderInfo, mss: u16) -> (usize, u16) {
	let offset = info.l4_offset();
	let mut udp = UdpPacket::new_unchecked(&mut header[offset..]);
	let old = udp.len();
	udp.set_len(mss.saturating_add(UDP_HEADER_LEN as u16));
	(offset + 4, old)
}
