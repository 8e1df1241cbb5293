//! Hardware transmit descriptor layout of the B0 generation.
//!
//! Every descriptor is 16 bytes: a 64-bit buffer address followed by two
//! control words. Context descriptors carry segmentation and VLAN metadata for
//! the data descriptors following them and never point to a buffer.

use alloc::vec::Vec;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::drivers::net::atlantic::ring::{CsumFlags, TxFlags, TxRing};

pub const TXD_SIZE: usize = 16;

pub const TXD_CTL_DESC_TYPE_MSK: u32 = 0x0000_0003;
pub const TXD_CTL_BLEN: u32 = 0x000F_FFF0;
pub const TXD_CTL_DD: u32 = 0x0010_0000;
pub const TXD_CTL_EOP: u32 = 0x0020_0000;
pub const TXD_CTL_CMD_VLAN: u32 = 1 << 22;
pub const TXD_CTL_CMD_IPCSO: u32 = 1 << 24;
pub const TXD_CTL_CMD_TUCSO: u32 = 1 << 25;
pub const TXD_CTL_CMD_LSO: u32 = 1 << 26;
pub const TXD_CTL_CMD_WB: u32 = 1 << 27;

// context descriptor only
pub const TXD_CTL_CMD_IPV6: u32 = 1 << 21;
pub const TXD_CTL_CMD_TCP: u32 = 1 << 22;

pub const TXD_CTL2_LEN: u32 = 0xFFFF_C000;
pub const TXD_CTL2_CTX_EN: u32 = 0x0000_2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum DescType {
	Data = 1,
	Context = 2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HwTxDesc {
	pub buf_addr: u64,
	pub ctl: u32,
	pub ctl2: u32,
}

impl HwTxDesc {
	pub fn desc_type(&self) -> Option<DescType> {
		DescType::try_from(self.ctl & TXD_CTL_DESC_TYPE_MSK).ok()
	}

	/// Buffer length of a data descriptor.
	pub fn buf_len(&self) -> u32 {
		(self.ctl & TXD_CTL_BLEN) >> 4
	}

	/// Payload length the hardware is told about, set on every data descriptor.
	pub fn pay_len(&self) -> u32 {
		(self.ctl2 & TXD_CTL2_LEN) >> 14
	}

	pub fn to_le_bytes(&self) -> [u8; TXD_SIZE] {
		let mut bytes = [0u8; TXD_SIZE];
		bytes[..8].copy_from_slice(&self.buf_addr.to_le_bytes());
		bytes[8..12].copy_from_slice(&self.ctl.to_le_bytes());
		bytes[12..].copy_from_slice(&self.ctl2.to_le_bytes());
		bytes
	}
}

/// Encodes `count` committed slots starting at `start` into hardware format.
///
/// `start` has to be the first descriptor of a packet. Context state carries
/// over to the data descriptors until the next end-of-packet descriptor.
pub fn encode(ring: &TxRing, start: u32, count: u32) -> Vec<(u32, HwTxDesc)> {
	let mut descs = Vec::with_capacity(count as usize);
	let mut pkt_len = ring.buff(start).len_pkt;
	let mut is_gso = false;
	let mut is_vlan = false;
	let mut dx = start;

	for _ in 0..count {
		let buff = ring.buff(dx);
		let mut txd = HwTxDesc::default();

		if buff.flags.contains(TxFlags::SOP) && !is_gso && !is_vlan {
			pkt_len = buff.len_pkt;
		}

		if buff.is_gso() {
			let gso = &buff.gso;
			if buff.flags.contains(TxFlags::GSO_TCP) {
				txd.ctl |= TXD_CTL_CMD_TCP;
			}
			txd.ctl |= u32::from(DescType::Context);
			txd.ctl |= (u32::from(gso.len_l3) << 31) | (u32::from(gso.len_l2) << 24);
			txd.ctl2 |= u32::from(gso.mss) << 16;
			if gso.is_ipv6 {
				txd.ctl |= TXD_CTL_CMD_IPV6;
			}
			txd.ctl2 |= (u32::from(gso.len_l4) << 8) | (u32::from(gso.len_l3) >> 1);

			is_gso = true;
			pkt_len = buff.len_pkt.saturating_sub(
				u32::from(gso.len_l4) + u32::from(gso.len_l3) + u32::from(gso.len_l2),
			);
		}

		if buff.flags.contains(TxFlags::VLAN) {
			txd.ctl |= u32::from(DescType::Context);
			txd.ctl |= u32::from(buff.vlan_tx_tag) << 4;
			is_vlan = true;
			if !buff.is_gso() {
				pkt_len = buff.len_pkt;
			}
		}

		if !buff.is_context() {
			txd.buf_addr = buff.pa.map_or(0, u64::from);
			txd.ctl |= TXD_CTL_BLEN & (buff.len << 4);
			txd.ctl |= u32::from(DescType::Data);
			txd.ctl2 |= TXD_CTL2_LEN & (pkt_len << 14);

			if is_gso || is_vlan {
				txd.ctl2 |= TXD_CTL2_CTX_EN;
			}
			if is_gso {
				txd.ctl |= TXD_CTL_CMD_LSO;
			}
			if buff.csum.contains(CsumFlags::IP) {
				txd.ctl |= TXD_CTL_CMD_IPCSO;
			}
			if buff.csum.intersects(CsumFlags::TCP | CsumFlags::UDP) {
				txd.ctl |= TXD_CTL_CMD_TUCSO;
			}
			if is_vlan {
				txd.ctl |= TXD_CTL_CMD_VLAN;
			}
			if buff.flags.contains(TxFlags::EOP) {
				txd.ctl |= TXD_CTL_EOP | TXD_CTL_CMD_WB;
				is_gso = false;
				is_vlan = false;
			}
		}

		descs.push((dx, txd));
		dx = ring.next_dx(dx);
	}

	descs
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::drivers::net::atlantic::hw::DmaAddr;
	use crate::drivers::net::atlantic::ring::GsoParams;

	#[test]
	fn single_data_descriptor() {
		let mut ring = TxRing::new(0, 8).unwrap();
		let buff = ring.buff_mut(0);
		buff.pa = Some(DmaAddr(0x1000));
		buff.len = 60;
		buff.len_pkt = 60;
		buff.flags = TxFlags::SOP | TxFlags::EOP | TxFlags::MAPPED;
		buff.csum = CsumFlags::IP | CsumFlags::TCP;
		ring.advance().unwrap();

		let descs = encode(&ring, 0, 1);
		let (dx, txd) = descs[0];
		assert_eq!(dx, 0);
		assert_eq!(txd.desc_type(), Some(DescType::Data));
		assert_eq!(txd.buf_addr, 0x1000);
		assert_eq!(txd.buf_len(), 60);
		assert_eq!(txd.pay_len(), 60);
		assert_ne!(txd.ctl & TXD_CTL_EOP, 0);
		assert_ne!(txd.ctl & TXD_CTL_CMD_WB, 0);
		assert_ne!(txd.ctl & TXD_CTL_CMD_IPCSO, 0);
		assert_ne!(txd.ctl & TXD_CTL_CMD_TUCSO, 0);
		assert_eq!(txd.ctl2 & TXD_CTL2_CTX_EN, 0);
		assert_eq!(txd.ctl & TXD_CTL_CMD_LSO, 0);
	}

	#[test]
	fn context_then_data() {
		let mut ring = TxRing::new(0, 8).unwrap();

		let ctx = ring.buff_mut(0);
		ctx.flags = TxFlags::CONTEXT | TxFlags::GSO_TCP | TxFlags::VLAN;
		ctx.len_pkt = 9014;
		ctx.vlan_tx_tag = 0x123;
		ctx.gso = GsoParams {
			mss: 1448,
			len_l2: 14,
			len_l3: 20,
			len_l4: 32,
			is_ipv6: false,
		};
		ring.advance().unwrap();

		let sop = ring.buff_mut(1);
		sop.pa = Some(DmaAddr(0x2000));
		sop.len = 66;
		sop.len_pkt = 9014;
		sop.flags = TxFlags::SOP | TxFlags::MAPPED;
		ring.advance().unwrap();

		let eop = ring.buff_mut(2);
		eop.pa = Some(DmaAddr(0x3000));
		eop.len = 8948;
		eop.flags = TxFlags::EOP | TxFlags::MAPPED;
		ring.advance().unwrap();

		let descs = encode(&ring, 0, 3);
		let ctx = descs[0].1;
		assert_eq!(ctx.desc_type(), Some(DescType::Context));
		assert_eq!(ctx.buf_addr, 0);
		assert_ne!(ctx.ctl & TXD_CTL_CMD_TCP, 0);
		assert_eq!(ctx.ctl & TXD_CTL_CMD_IPV6, 0);
		assert_eq!((ctx.ctl >> 24) & 0x7f, 14);
		assert_eq!((ctx.ctl >> 4) & 0xffff, 0x123);
		assert_eq!(ctx.ctl2 >> 16, 1448);
		assert_eq!((ctx.ctl2 >> 8) & 0xff, 32);
		assert_eq!(ctx.ctl2 & 0xff, 10);

		for (_, txd) in &descs[1..] {
			assert_eq!(txd.desc_type(), Some(DescType::Data));
			assert_eq!(txd.pay_len(), 9014 - 66);
			assert_ne!(txd.ctl2 & TXD_CTL2_CTX_EN, 0);
			assert_ne!(txd.ctl & TXD_CTL_CMD_LSO, 0);
			assert_ne!(txd.ctl & TXD_CTL_CMD_VLAN, 0);
		}
		assert_eq!(descs[1].1.ctl & TXD_CTL_EOP, 0);
		assert_ne!(descs[2].1.ctl & TXD_CTL_EOP, 0);
		assert_eq!(descs[2].1.buf_len(), 8948);
	}

	#[test]
	fn little_endian_layout() {
		let txd = HwTxDesc {
			buf_addr: 0x1122_3344_5566_7788,
			ctl: 0xaabb_ccdd,
			ctl2: 0x0102_0304,
		};
		let bytes = txd.to_le_bytes();
		assert_eq!(bytes[0], 0x88);
		assert_eq!(bytes[7], 0x11);
		assert_eq!(bytes[8], 0xdd);
		assert_eq!(bytes[15], 0x01);
	}
}
