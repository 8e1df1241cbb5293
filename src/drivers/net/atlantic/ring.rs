//! Transmit descriptor ring.
//!
//! The ring is a fixed-size array of [`TxBuff`] slots with a producer index
//! (`tail`, owned by the submission path) and a consumer index (`head`,
//! owned by the completion path). One slot always stays unused so that a full
//! ring can be told apart from an empty one.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::mem;

use thiserror::Error;

use crate::drivers::net::atlantic::hw::{DmaAddr, DmaMapper, TxStatus, TxWriteback};
use crate::drivers::net::atlantic::segment::TxPacket;

bitflags! {
	/// Role of a descriptor within its packet.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct TxFlags: u16 {
		/// Start of packet
		const SOP = 1 << 0;
		/// End of packet
		const EOP = 1 << 1;
		/// `pa` holds a live mapping that has to be released on retirement
		const MAPPED = 1 << 2;
		/// Metadata only, never points to data
		const CONTEXT = 1 << 3;
		const VLAN = 1 << 4;
		const GSO_TCP = 1 << 5;
		const GSO_UDP = 1 << 6;
		const REQUEST_TS = 1 << 7;
	}
}

bitflags! {
	/// Checksums the hardware inserts for this packet.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct CsumFlags: u8 {
		const IP = 1 << 0;
		const TCP = 1 << 1;
		const UDP = 1 << 2;
	}
}

/// Segmentation parameters carried by a context descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GsoParams {
	pub mss: u16,
	pub len_l2: u8,
	pub len_l3: u16,
	pub len_l4: u16,
	pub is_ipv6: bool,
}

/// Software state of one ring slot.
#[derive(Debug, Default)]
pub struct TxBuff {
	pub pa: Option<DmaAddr>,
	pub len: u32,
	pub flags: TxFlags,
	pub csum: CsumFlags,
	/// Total packet length, set on the start-of-packet and context descriptors
	pub len_pkt: u32,
	/// Valid if `GSO_TCP` or `GSO_UDP` is set
	pub gso: GsoParams,
	/// Valid if `VLAN` is set
	pub vlan_tx_tag: u16,
	/// Set on the start-of-packet descriptor
	pub eop_index: Option<u32>,
	/// Set on the end-of-packet descriptor
	pub sop_index: Option<u32>,
	/// Valid if `REQUEST_TS` is set
	pub clk_sel: u8,
	pub(crate) packet: Option<TxPacket>,
}

impl TxBuff {
	pub fn is_context(&self) -> bool {
		self.flags.contains(TxFlags::CONTEXT)
	}

	pub fn is_gso(&self) -> bool {
		self.flags.intersects(TxFlags::GSO_TCP | TxFlags::GSO_UDP)
	}

	pub fn has_packet(&self) -> bool {
		self.packet.is_some()
	}
}

/// Handed to the completion callback once per retired packet.
#[derive(Debug)]
pub struct TxCompletion {
	pub ring: u16,
	/// Index of the end-of-packet descriptor
	pub index: u32,
	pub packet: TxPacket,
	pub ok: bool,
	/// Only present if the packet requested a timestamp
	pub timestamp: Option<u64>,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
	#[error("no free descriptor left in the ring")]
	Full,
	#[error("a ring needs at least two descriptors, got {0}")]
	TooSmall(u32),
}

pub struct TxRing {
	idx: u16,
	size: u32,
	buff_ring: Box<[TxBuff]>,
	head: u32,
	tail: u32,
}

impl TxRing {
	/// Creates an empty ring with `size` slots for hardware ring `idx`.
	pub fn new(idx: u16, size: u32) -> Result<Self, RingError> {
		if size < 2 {
			return Err(RingError::TooSmall(size));
		}

		let buff_ring = (0..size)
			.map(|_| TxBuff::default())
			.collect::<Vec<_>>()
			.into_boxed_slice();

		Ok(Self {
			idx,
			size,
			buff_ring,
			head: 0,
			tail: 0,
		})
	}

	pub fn idx(&self) -> u16 {
		self.idx
	}

	pub fn capacity(&self) -> u32 {
		self.size
	}

	pub fn head(&self) -> u32 {
		self.head
	}

	pub fn tail(&self) -> u32 {
		self.tail
	}

	pub fn next_dx(&self, dx: u32) -> u32 {
		let next = dx + 1;
		if next >= self.size { 0 } else { next }
	}

	pub fn in_flight(&self) -> u32 {
		if self.tail >= self.head {
			self.tail - self.head
		} else {
			self.size - self.head + self.tail
		}
	}

	pub fn free_slots(&self) -> u32 {
		self.size - 1 - self.in_flight()
	}

	pub fn is_empty(&self) -> bool {
		self.head == self.tail
	}

	/// Returns the slot the next descriptor goes into without claiming it.
	pub fn reserve_next(&self) -> Result<u32, RingError> {
		if self.free_slots() == 0 {
			Err(RingError::Full)
		} else {
			Ok(self.tail)
		}
	}

	/// Hands the slot at `tail` over to the hardware side.
	pub fn advance(&mut self) -> Result<(), RingError> {
		self.reserve_next()?;
		self.tail = self.next_dx(self.tail);
		Ok(())
	}

	/// Hands `count` consecutive slots starting at `tail` over at once.
	pub fn commit(&mut self, count: u32) -> Result<(), RingError> {
		if count > self.free_slots() {
			return Err(RingError::Full);
		}
		self.tail = (self.tail + count) % self.size;
		Ok(())
	}

	pub fn buff(&self, dx: u32) -> &TxBuff {
		&self.buff_ring[dx as usize]
	}

	pub(crate) fn buff_mut(&mut self, dx: u32) -> &mut TxBuff {
		&mut self.buff_ring[dx as usize]
	}

	/// Whether `dx` lies between `head` (inclusive) and `tail` (exclusive).
	fn is_in_flight(&self, dx: u32) -> bool {
		if dx >= self.size {
			return false;
		}
		let dist = if dx >= self.head {
			dx - self.head
		} else {
			self.size - self.head + dx
		};
		dist < self.in_flight()
	}

	/// Retires every in-flight slot up to and including `completed`.
	///
	/// Mappings are released before a slot can be reused and every packet is
	/// completed exactly once. Returns the number of retired slots.
	pub fn retire_through<M, W>(
		&mut self,
		completed: u32,
		mapper: &M,
		writeback: &W,
		on_complete: &mut dyn FnMut(TxCompletion),
	) -> u32
	where
		M: DmaMapper + ?Sized,
		W: TxWriteback + ?Sized,
	{
		if !self.is_in_flight(completed) {
			warn!(
				"Ring {}: completion index {completed} is not in flight (head {}, tail {})",
				self.idx, self.head, self.tail
			);
			return 0;
		}

		let idx = self.idx;
		let mut retired = 0;
		loop {
			let dx = self.head;
			self.release(dx, |index| writeback.status(idx, index), mapper, on_complete);
			self.head = self.next_dx(dx);
			retired += 1;

			if dx == completed {
				break;
			}
		}

		trace!(
			"Ring {}: retired {retired} descriptors, head {}",
			self.idx, self.head
		);
		retired
	}

	/// Retires everything still in flight as aborted. Used on tear-down.
	pub fn drain<M>(&mut self, mapper: &M, on_complete: &mut dyn FnMut(TxCompletion)) -> u32
	where
		M: DmaMapper + ?Sized,
	{
		let mut retired = 0;
		while self.head != self.tail {
			let dx = self.head;
			self.release(dx, |_| TxStatus::ABORTED, mapper, on_complete);
			self.head = self.next_dx(dx);
			retired += 1;
		}

		if retired > 0 {
			debug!("Ring {}: dropped {retired} descriptors on tear-down", self.idx);
		}
		retired
	}

	fn release<M, S>(
		&mut self,
		dx: u32,
		status: S,
		mapper: &M,
		on_complete: &mut dyn FnMut(TxCompletion),
	) where
		M: DmaMapper + ?Sized,
		S: FnOnce(u32) -> TxStatus,
	{
		let buff = mem::take(self.buff_mut(dx));

		if buff.flags.contains(TxFlags::MAPPED)
			&& let Some(pa) = buff.pa
		{
			mapper.unmap(pa, buff.len as usize);
		}

		if let Some(packet) = buff.packet {
			let status = status(dx);
			let timestamp = if buff.flags.contains(TxFlags::REQUEST_TS) {
				status.timestamp
			} else {
				None
			};
			on_complete(TxCompletion {
				ring: self.idx,
				index: dx,
				packet,
				ok: status.ok,
				timestamp,
			});
		}
	}
}
