//! Wire constants and fixed-size kernel structs for traffic-control
//! actions.

use crate::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Address family for action messages (AF_UNSPEC).
pub const AF_UNSPEC: u8 = 0;

/// Maximum size of a TC kind string, including the null terminator.
pub const TCKINDSIZ: usize = 32;

/// Maximum number of actions in one chain.
pub const TCA_ACT_MAX_PRIO: usize = 32;

/// Top-level attribute carrying the action table.
pub const TCA_ACT_TAB: u16 = 1;

// Per-action attributes (inside each order-tagged nest).
pub const TCA_ACT_UNSPEC: u16 = 0;
pub const TCA_ACT_KIND: u16 = 1;
pub const TCA_ACT_OPTIONS: u16 = 2;
pub const TCA_ACT_INDEX: u16 = 3;
pub const TCA_ACT_STATS: u16 = 4;
pub const TCA_ACT_MAX: u16 = 4;

// Statistics attributes (inside TCA_ACT_STATS).
pub const TCA_STATS_UNSPEC: u16 = 0;
pub const TCA_STATS_BASIC: u16 = 1;
pub const TCA_STATS_RATE_EST: u16 = 2;
pub const TCA_STATS_QUEUE: u16 = 3;
pub const TCA_STATS_APP: u16 = 4;
pub const TCA_STATS_RATE_EST64: u16 = 5;
pub const TCA_STATS_MAX: u16 = 5;

// Generic action verdicts (tc_gen.action values).
pub const TC_ACT_UNSPEC: i32 = -1;
pub const TC_ACT_OK: i32 = 0;
pub const TC_ACT_RECLASSIFY: i32 = 1;
pub const TC_ACT_SHOT: i32 = 2;
pub const TC_ACT_PIPE: i32 = 3;
pub const TC_ACT_STOLEN: i32 = 4;

// gact attributes.
pub const TCA_GACT_TM: u16 = 1;
pub const TCA_GACT_PARMS: u16 = 2;
pub const TCA_GACT_PROB: u16 = 3;

// mirred attributes.
pub const TCA_MIRRED_TM: u16 = 1;
pub const TCA_MIRRED_PARMS: u16 = 2;

// mirred eaction values.
pub const TCA_EGRESS_REDIR: i32 = 1;
pub const TCA_EGRESS_MIRROR: i32 = 2;
pub const TCA_INGRESS_REDIR: i32 = 3;
pub const TCA_INGRESS_MIRROR: i32 = 4;

/// Action message header (mirrors struct tcamsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct TcaMsg {
    /// Address family, always AF_UNSPEC for actions.
    pub tca_family: u8,
    pub tca_pad1: u8,
    pub tca_pad2: u16,
}

impl TcaMsg {
    /// Header with the family actions use.
    pub fn new() -> Self {
        Self {
            tca_family: AF_UNSPEC,
            tca_pad1: 0,
            tca_pad2: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Size of the tcamsg header.
pub const TCAMSG_HDRLEN: usize = std::mem::size_of::<TcaMsg>();

/// Basic byte/packet counters (mirrors struct gnet_stats_basic, padded
/// to its in-kernel 16-byte layout).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GnetStatsBasic {
    pub bytes: u64,
    pub packets: u32,
    pub pad: u32,
}

/// Rate estimator, 32-bit counters (mirrors struct gnet_stats_rate_est).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GnetStatsRateEst {
    pub bps: u32,
    pub pps: u32,
}

/// Rate estimator, 64-bit counters (mirrors struct gnet_stats_rate_est64).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GnetStatsRateEst64 {
    pub bps: u64,
    pub pps: u64,
}

/// Queue statistics (mirrors struct gnet_stats_queue).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GnetStatsQueue {
    pub qlen: u32,
    pub backlog: u32,
    pub drops: u32,
    pub requeues: u32,
    pub overlimits: u32,
}

/// Common action parameter block (mirrors struct tc_gen).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct TcGen {
    pub index: u32,
    pub capab: u32,
    pub action: i32,
    pub refcnt: i32,
    pub bindcnt: i32,
}

/// mirred parameter block (mirrors struct tc_mirred).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct TcMirred {
    pub index: u32,
    pub capab: u32,
    pub action: i32,
    pub refcnt: i32,
    pub bindcnt: i32,
    pub eaction: i32,
    pub ifindex: u32,
}
