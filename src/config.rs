use core::time::Duration;

/// Largest buffer a single data descriptor may point to
pub const TX_FRAME_MAX: u32 = 16 * 1024;

/// Maximum number of fragments per packet, header region included
pub const SKB_FRAGS_MAX: usize = 32;

pub const VECS_DEF: u32 = 8;

pub const TCS_DEF: u32 = 1;

pub const TCS_MAX: u32 = 8;

/// Number of hardware transmit rings shared by all traffic classes
pub const TX_RINGS_MAX: u32 = 32;

pub const NUM_RSS_QUEUES_DEF: u32 = 8;

pub const RSS_INDIRECTION_TABLE_MAX: usize = 64;

pub const RSS_HASHKEY_LEN: usize = 40;

pub const RSS_HASHKEY: [u8; RSS_HASHKEY_LEN] = [
	0x1e, 0xad, 0x71, 0x87, 0x65, 0xfc, 0x26, 0x7d, 0x0d, 0x45, 0x67, 0x74, 0xcd, 0x06, 0x1a, 0x18,
	0xb6, 0xc1, 0xf0, 0xc7, 0xbb, 0x18, 0xbe, 0xf8, 0x19, 0x13, 0x4b, 0xa9, 0xd0, 0x3e, 0xfe, 0x70,
	0x25, 0x03, 0xab, 0x50, 0x6a, 0x8b, 0x82, 0x0c,
];

pub const TXDS_DEF: u32 = 4096;

pub const RXDS_DEF: u32 = 2048;

/// A stopped queue is woken once this many descriptors are free again
pub const RESTART_DESC_THRES: u32 = 64;

/// Interrupt vectors reserved for the service interrupt
pub const SERVICE_IRQS: u32 = 1;

/// Interrupt vectors reserved for PTP
pub const PTP_IRQS: u32 = 2;

/// PTP needs more traffic classes than this
pub const PTP_TC: u32 = 2;

/// `itr` value selecting speed dependent interrupt moderation
pub const ITR_AUTO: u32 = 0xffff;

pub const TC_MAX_RATE_MIN: u32 = 10;

pub const TC_MIN_RATE_MIN: u32 = 20;

pub const SERVICE_TIMER_INTERVAL: Duration = Duration::from_secs(1);

pub const POLLING_TIMER_INTERVAL: Duration = Duration::from_millis(50);
