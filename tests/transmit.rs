use std::collections::BTreeMap;

use atlantic::drivers::net::atlantic::desc::{DescType, HwTxDesc};
use atlantic::drivers::net::atlantic::hw::{
	DmaAddr, DmaMapper, Duplex, FlowControl, HwCaps, HwError, HwOps, LinkQuery, LinkStatus,
	MappingError, QueryError, TxStatus, TxWriteback,
};
use atlantic::drivers::net::atlantic::link::{LinkEvent, LinkState};
use atlantic::drivers::net::atlantic::moderation::ItrSettings;
use atlantic::drivers::net::atlantic::ring::TxCompletion;
use atlantic::drivers::net::atlantic::segment::{L4Proto, TxPacket};
use atlantic::drivers::net::atlantic::topology::IrqType;
use atlantic::{AtlanticNic, HostResources, NicConfig, TxError};
use hermit_sync::SpinMutex;

#[derive(Default)]
struct Bus {
	next: u64,
	live: BTreeMap<u64, usize>,
}

#[derive(Default)]
struct Iommu(SpinMutex<Bus>);

impl DmaMapper for Iommu {
	fn map(&self, region: &[u8]) -> Result<DmaAddr, MappingError> {
		let mut bus = self.0.lock();
		bus.next += 0x1000;
		let addr = bus.next;
		bus.live.insert(addr, region.len());
		Ok(DmaAddr(addr))
	}

	fn unmap(&self, addr: DmaAddr, len: usize) {
		assert_eq!(self.0.lock().live.remove(&addr.0), Some(len));
	}
}

#[derive(Default)]
struct Registers {
	doorbells: Vec<(u16, Vec<(u32, HwTxDesc)>, u32)>,
	itr: Vec<ItrSettings>,
	flow_control: Vec<FlowControl>,
}

#[derive(Default)]
struct Chip(SpinMutex<Registers>);

impl HwOps for Chip {
	fn ring_tx_xmit(&self, ring: u16, descs: &[(u32, HwTxDesc)], tail: u32) -> Result<(), HwError> {
		self.0.lock().doorbells.push((ring, descs.to_vec(), tail));
		Ok(())
	}

	fn ring_tx_start(&self, _ring: u16) -> Result<(), HwError> {
		Ok(())
	}

	fn ring_tx_stop(&self, _ring: u16) -> Result<(), HwError> {
		Ok(())
	}

	fn ring_tx_head(&self, _ring: u16) -> Result<u32, HwError> {
		Err(HwError::NotSupported)
	}

	fn set_interrupt_moderation(&self, settings: &ItrSettings) -> Result<(), HwError> {
		self.0.lock().itr.push(*settings);
		Ok(())
	}

	fn set_flow_control(&self, fc: FlowControl) -> Result<(), HwError> {
		self.0.lock().flow_control.push(fc);
		Ok(())
	}
}

struct Phy(SpinMutex<LinkStatus>);

impl Phy {
	fn set(&self, mbps: u32) {
		*self.0.lock() = LinkStatus {
			mbps,
			duplex: Duplex::Full,
			flow_control: FlowControl::RX,
		};
	}
}

impl LinkQuery for Phy {
	fn query(&self) -> Result<LinkStatus, QueryError> {
		Ok(*self.0.lock())
	}
}

struct Delivered;

impl TxWriteback for Delivered {
	fn status(&self, _ring: u16, _index: u32) -> TxStatus {
		TxStatus {
			ok: true,
			timestamp: None,
		}
	}
}

type Nic = AtlanticNic<Chip, Iommu, Phy>;

fn nic(cpus: u32, irq_vectors: u32) -> Nic {
	AtlanticNic::new(
		Chip::default(),
		Iommu::default(),
		Phy(SpinMutex::new(LinkStatus::down())),
		HwCaps::atlantic_b0(),
		NicConfig::default(),
		HostResources {
			device: "0000:05:00.0".into(),
			cpus,
			irq_vectors,
			irq_type: IrqType::MsiX,
		},
	)
}

fn tcp_frame(payload: usize) -> TxPacket {
	let mut header = Vec::new();
	header.extend_from_slice(&[0x00, 0x17, 0xb6, 0, 0, 2, 0x00, 0x17, 0xb6, 0, 0, 1, 0x08, 0x00]);
	let total = (40 + payload) as u16;
	header.extend_from_slice(&[0x45, 0]);
	header.extend_from_slice(&total.to_be_bytes());
	header.extend_from_slice(&[0, 0, 0x40, 0, 64, 6, 0, 0, 192, 168, 0, 1, 192, 168, 0, 2]);
	let mut tcp = [0u8; 20];
	tcp[12] = 5 << 4;
	header.extend_from_slice(&tcp);
	TxPacket::new(header).with_frag(vec![0xa5; payload])
}

#[test]
fn lifecycle() {
	let nic = nic(4, 7);
	nic.init().unwrap();
	nic.start().unwrap();

	assert_eq!(nic.xmit(tcp_frame(64), 0, 0).unwrap_err().reason, TxError::LinkDown);

	nic.link().set(10000);
	nic.service_task().unwrap();
	assert_eq!(
		nic.link_state(),
		LinkState::Up {
			mbps: 10000,
			duplex: Duplex::Full
		}
	);
	assert_eq!(nic.flow_control(), FlowControl::RX);

	let tso = tcp_frame(9000).with_gso(L4Proto::Tcp, 1448).with_csum_offload();
	assert_eq!(nic.xmit(tso, 3, 0).unwrap(), 3);
	assert_eq!(nic.xmit(tcp_frame(64), 3, 0).unwrap(), 2);

	let mut done: Vec<TxCompletion> = Vec::new();
	assert_eq!(nic.complete_tx(3, 4, &Delivered, &mut |c| done.push(c)), 5);
	assert_eq!(done.len(), 2);
	assert!(done.iter().all(|c| c.ok && c.ring == 3));

	nic.link().set(0);
	nic.service_task().unwrap();
	assert_eq!(
		nic.drain_link_events(),
		[
			LinkEvent::Up {
				mbps: 10000,
				duplex: Duplex::Full
			},
			LinkEvent::Down
		]
	);

	assert!(nic.stop().is_empty());
}

#[test]
fn descriptors_reach_the_doorbell() {
	let nic = nic(1, 1);
	nic.init().unwrap();
	nic.start().unwrap();
	nic.link().set(1000);
	nic.service_task().unwrap();

	nic.xmit(tcp_frame(100).with_csum_offload(), 0, 0).unwrap();

	let regs = nic.hw().0.lock();
	let (ring, descs, tail) = &regs.doorbells[0];
	assert_eq!(*ring, 0);
	assert_eq!(*tail, 2);
	assert_eq!(descs.len(), 2);
	assert!(
		descs
			.iter()
			.all(|(_, desc)| desc.desc_type() == Some(DescType::Data))
	);
	assert_eq!(descs[0].1.buf_len(), 54);
	assert_eq!(descs[1].1.buf_len(), 100);
	assert_eq!(descs[0].1.pay_len(), 154);
	assert_eq!(regs.itr.last().unwrap().mbps, 1000);
	assert_eq!(regs.flow_control, [FlowControl::RX]);
}

#[test]
fn traffic_classes_can_change_while_running() {
	let nic = nic(8, 11);
	nic.init().unwrap();
	nic.start().unwrap();
	nic.link().set(5000);
	nic.service_task().unwrap();

	nic.xmit(tcp_frame(64), 1, 0).unwrap();
	let aborted = nic.setup_tc(4, Some([0, 0, 1, 1, 2, 2, 3, 3])).unwrap();
	assert_eq!(aborted.len(), 1);
	assert!(!aborted[0].ok);

	let datapath = nic.datapath().unwrap();
	assert_eq!(datapath.topology().tcs(), 4);
	assert_eq!(datapath.topology().vecs(), 8);
	assert_eq!(datapath.queues().len(), 32);

	// priority 7 maps to the last traffic class
	nic.xmit(tcp_frame(64), 2, 7).unwrap();
	assert_eq!(nic.ring_state(26).unwrap().in_flight, 2);
	assert_eq!(nic.mapper().0.lock().live.len(), 2);
}
