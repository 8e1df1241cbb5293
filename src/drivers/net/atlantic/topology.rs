//! Negotiation of the queue layout.
//!
//! The hardware provides 32 transmit rings which are split between traffic
//! classes. In 8-TC mode every tc owns 4 rings, in 4-TC mode every tc owns 8.
//! Every tc uses the first `vecs` rings of its block.

use crate::config::{
	NUM_RSS_QUEUES_DEF, PTP_IRQS, RSS_HASHKEY, RSS_HASHKEY_LEN, RSS_INDIRECTION_TABLE_MAX,
	SERVICE_IRQS, TCS_MAX, TX_RINGS_MAX, VECS_DEF,
};
use crate::drivers::net::atlantic::hw::ChipFeatures;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcMode {
	EightTcs,
	FourTcs,
}

impl TcMode {
	pub fn rings_per_tc(self) -> u32 {
		match self {
			Self::EightTcs => 4,
			Self::FourTcs => 8,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IrqType {
	Legacy,
	Msi,
	#[default]
	MsiX,
}

/// Interrupt vectors left for the queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqBudget {
	pub usable: u32,
	/// A dedicated vector for link-state interrupts exists
	pub link_irq: bool,
}

impl IrqBudget {
	/// Splits `allocated` vectors into queue vectors, the service vector and
	/// the PTP vectors, in this order of priority.
	pub fn from_allocated(allocated: u32) -> Self {
		if allocated > SERVICE_IRQS + PTP_IRQS {
			Self {
				usable: allocated - SERVICE_IRQS - PTP_IRQS,
				link_irq: true,
			}
		} else if allocated > PTP_IRQS {
			Self {
				usable: allocated - PTP_IRQS,
				link_irq: false,
			}
		} else {
			Self {
				usable: 1,
				link_irq: false,
			}
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationInput {
	pub hw_max_vectors: u32,
	/// Number of CPUs that may run queues in parallel
	pub host_parallelism: u32,
	pub irq: IrqBudget,
	pub irq_type: IrqType,
	pub tcs: u32,
	pub chip: ChipFeatures,
	pub rss_cap: u32,
	/// Explicit priority to tc map, derived from `tcs` if `None`
	pub prio_tc_map: Option<[u8; 8]>,
}

/// Immutable result of a negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
	vecs: u32,
	tcs: u32,
	tc_mode: TcMode,
	is_rss: bool,
	rss_queues: u32,
	indirection_table: [u8; RSS_INDIRECTION_TABLE_MAX],
	rss_key: [u8; RSS_HASHKEY_LEN],
	prio_tc_map: [u8; 8],
	link_irq_vec: u32,
}

fn rounddown_pow2(n: u32) -> u32 {
	n.checked_ilog2().map_or(1, |log| 1 << log)
}

/// Default priority to tc map, spreading the 8 priorities evenly.
pub fn default_prio_tc_map(tcs: u32) -> [u8; 8] {
	let mut map = [0u8; 8];
	for (i, tc) in (0u32..).zip(map.iter_mut()) {
		*tc = (tcs * i / 8) as u8;
	}
	map
}

impl QueueTopology {
	pub fn negotiate(input: &NegotiationInput) -> Self {
		let tcs = input.tcs.clamp(1, TCS_MAX);

		let mut vecs = input
			.hw_max_vectors
			.min(VECS_DEF)
			.min(input.host_parallelism)
			.min(input.irq.usable)
			.max(1);
		vecs = rounddown_pow2(vecs);

		if input.chip.contains(ChipFeatures::ANTIGUA) && tcs > 2 {
			vecs = vecs.min(4);
		}
		vecs = vecs.min(TX_RINGS_MAX / tcs);

		let tc_mode = if vecs <= 4 {
			TcMode::EightTcs
		} else {
			TcMode::FourTcs
		};

		let mut is_rss = true;
		if input.irq_type == IrqType::Legacy || input.hw_max_vectors <= 1 || vecs == 1 {
			is_rss = false;
			vecs = 1;
		}

		let rss_queues = vecs.min(NUM_RSS_QUEUES_DEF).min(input.rss_cap.max(1));
		let mut indirection_table = [0u8; RSS_INDIRECTION_TABLE_MAX];
		for (i, entry) in (0u32..).zip(indirection_table.iter_mut()) {
			*entry = (i % rss_queues) as u8;
		}

		let prio_tc_map = input
			.prio_tc_map
			.unwrap_or_else(|| default_prio_tc_map(tcs));

		let link_irq_vec = if input.irq.link_irq { vecs } else { 0 };

		debug!(
			"Negotiated {vecs} vectors, {tcs} tcs ({tc_mode:?}), {rss_queues} RSS queues, link irq {link_irq_vec}"
		);

		Self {
			vecs,
			tcs,
			tc_mode,
			is_rss,
			rss_queues,
			indirection_table,
			rss_key: RSS_HASHKEY,
			prio_tc_map,
			link_irq_vec,
		}
	}

	pub fn vecs(&self) -> u32 {
		self.vecs
	}

	pub fn tcs(&self) -> u32 {
		self.tcs
	}

	pub fn tc_mode(&self) -> TcMode {
		self.tc_mode
	}

	pub fn is_rss(&self) -> bool {
		self.is_rss
	}

	pub fn rss_queues(&self) -> u32 {
		self.rss_queues
	}

	pub fn indirection_table(&self) -> &[u8; RSS_INDIRECTION_TABLE_MAX] {
		&self.indirection_table
	}

	pub fn rss_key(&self) -> &[u8; RSS_HASHKEY_LEN] {
		&self.rss_key
	}

	pub fn prio_tc_map(&self) -> &[u8; 8] {
		&self.prio_tc_map
	}

	/// Vector of the link-state interrupt, `0` if link state is only polled.
	pub fn link_irq_vec(&self) -> u32 {
		self.link_irq_vec
	}

	/// First software queue of traffic class `tc`.
	pub fn tc_queue_offset(&self, tc: u32) -> u32 {
		self.vecs * tc
	}

	pub fn queue_count(&self) -> u32 {
		self.vecs * self.tcs
	}

	/// Hardware ring serving (`tc`, `vec`).
	pub fn ring_index(&self, tc: u32, vec: u32) -> Option<u16> {
		if tc >= self.tcs || vec >= self.vecs {
			return None;
		}
		u16::try_from(tc * self.tc_mode.rings_per_tc() + vec).ok()
	}

	pub fn tc_for_priority(&self, priority: u8) -> u32 {
		let tc = u32::from(self.prio_tc_map[usize::from(priority % 8)]);
		tc.min(self.tcs - 1)
	}

	/// Picks the ring for a packet with flow hash or queue id `key` and `priority`.
	pub fn select(&self, key: u32, priority: u8) -> (u32, u32) {
		(self.tc_for_priority(priority), key % self.vecs)
	}

	/// Iterates over every (tc, vec, ring) triple of the layout.
	pub fn rings(&self) -> impl Iterator<Item = (u32, u32, u16)> + '_ {
		(0..self.tcs).flat_map(move |tc| {
			(0..self.vecs).filter_map(move |vec| self.ring_index(tc, vec).map(|ring| (tc, vec, ring)))
		})
	}
}
