//! Decoder for the statistics block attached to an action record.

use crate::attr::{AttrPolicy, parse_attrs};
use crate::error::{Error, Result};
use crate::types::{
    GnetStatsBasic, GnetStatsQueue, GnetStatsRateEst, GnetStatsRateEst64, TCA_STATS_BASIC,
    TCA_STATS_MAX, TCA_STATS_QUEUE, TCA_STATS_RATE_EST, TCA_STATS_RATE_EST64,
};
use zerocopy::FromBytes;

/// Aggregated counters decoded from a TCA_ACT_STATS nest.
///
/// Fields the kernel did not report stay zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionStats {
    /// Bytes seen by the action.
    pub bytes: u64,
    /// Packets seen by the action.
    pub packets: u64,
    /// Packets dropped.
    pub drops: u64,
    /// Packets over the configured limit.
    pub overlimits: u64,
    /// Estimated rate in bytes per second.
    pub rate_bps: u64,
    /// Estimated rate in packets per second.
    pub rate_pps: u64,
}

/// Minimum payload lengths for the statistics attributes.
const STATS_POLICY: AttrPolicy<'static> = AttrPolicy::new(&[
    (TCA_STATS_BASIC, std::mem::size_of::<GnetStatsBasic>()),
    (TCA_STATS_RATE_EST, std::mem::size_of::<GnetStatsRateEst>()),
    (TCA_STATS_QUEUE, std::mem::size_of::<GnetStatsQueue>()),
    (
        TCA_STATS_RATE_EST64,
        std::mem::size_of::<GnetStatsRateEst64>(),
    ),
]);

/// Read one fixed-size counter block by value (wire data is only
/// 4-aligned, so u64-bearing structs cannot be referenced in place).
fn read_block<T: FromBytes>(kind: u16, data: &[u8]) -> Result<T> {
    T::read_from_prefix(data)
        .map(|(block, _)| block)
        .map_err(|_| Error::MalformedAttribute {
            kind,
            len: data.len(),
            min: std::mem::size_of::<T>(),
        })
}

/// Decode the payload of a TCA_ACT_STATS nest.
///
/// Absent sub-attributes leave their fields zero. A present but
/// too-short sub-attribute fails the decode. The 64-bit rate estimator
/// takes precedence over the 32-bit one when both are present.
pub fn decode_stats(payload: &[u8]) -> Result<ActionStats> {
    let tb = parse_attrs(payload, TCA_STATS_MAX, STATS_POLICY)?;
    let mut stats = ActionStats::default();

    if let Some(data) = tb[TCA_STATS_BASIC as usize] {
        let basic: GnetStatsBasic = read_block(TCA_STATS_BASIC, data)?;
        stats.bytes = basic.bytes;
        stats.packets = basic.packets as u64;
    }

    if let Some(data) = tb[TCA_STATS_RATE_EST64 as usize] {
        let est: GnetStatsRateEst64 = read_block(TCA_STATS_RATE_EST64, data)?;
        stats.rate_bps = est.bps;
        stats.rate_pps = est.pps;
    } else if let Some(data) = tb[TCA_STATS_RATE_EST as usize] {
        let est: GnetStatsRateEst = read_block(TCA_STATS_RATE_EST, data)?;
        stats.rate_bps = est.bps as u64;
        stats.rate_pps = est.pps as u64;
    }

    if let Some(data) = tb[TCA_STATS_QUEUE as usize] {
        let queue: GnetStatsQueue = read_block(TCA_STATS_QUEUE, data)?;
        stats.drops = queue.drops as u64;
        stats.overlimits = queue.overlimits as u64;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{NlAttr, nla_align};
    use crate::error::Error;
    use zerocopy::IntoBytes;

    fn attr_bytes(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = NlAttr::new(kind, payload.len()).as_bytes().to_vec();
        buf.extend_from_slice(payload);
        buf.resize(nla_align(buf.len()), 0);
        buf
    }

    #[test]
    fn test_empty_payload() {
        let stats = decode_stats(&[]).unwrap();
        assert_eq!(stats, ActionStats::default());
    }

    #[test]
    fn test_basic_and_queue() {
        let basic = GnetStatsBasic {
            bytes: 123456,
            packets: 789,
            pad: 0,
        };
        let queue = GnetStatsQueue {
            qlen: 0,
            backlog: 0,
            drops: 5,
            requeues: 0,
            overlimits: 9,
        };
        let mut buf = attr_bytes(TCA_STATS_BASIC, basic.as_bytes());
        buf.extend_from_slice(&attr_bytes(TCA_STATS_QUEUE, queue.as_bytes()));

        let stats = decode_stats(&buf).unwrap();
        assert_eq!(stats.bytes, 123456);
        assert_eq!(stats.packets, 789);
        assert_eq!(stats.drops, 5);
        assert_eq!(stats.overlimits, 9);
        assert_eq!(stats.rate_bps, 0);
    }

    #[test]
    fn test_rate_est64_takes_precedence() {
        let est32 = GnetStatsRateEst { bps: 100, pps: 10 };
        let est64 = GnetStatsRateEst64 {
            bps: u64::from(u32::MAX) + 1,
            pps: 999,
        };
        let mut buf = attr_bytes(TCA_STATS_RATE_EST, est32.as_bytes());
        buf.extend_from_slice(&attr_bytes(TCA_STATS_RATE_EST64, est64.as_bytes()));

        let stats = decode_stats(&buf).unwrap();
        assert_eq!(stats.rate_bps, u64::from(u32::MAX) + 1);
        assert_eq!(stats.rate_pps, 999);
    }

    #[test]
    fn test_rate_est32_fallback() {
        let est32 = GnetStatsRateEst { bps: 100, pps: 10 };
        let buf = attr_bytes(TCA_STATS_RATE_EST, est32.as_bytes());

        let stats = decode_stats(&buf).unwrap();
        assert_eq!(stats.rate_bps, 100);
        assert_eq!(stats.rate_pps, 10);
    }

    #[test]
    fn test_short_basic_rejected() {
        let buf = attr_bytes(TCA_STATS_BASIC, &[0u8; 8]);
        assert!(matches!(
            decode_stats(&buf),
            Err(Error::MalformedAttribute {
                kind: TCA_STATS_BASIC,
                len: 8,
                min: 16
            })
        ));
    }

    #[test]
    fn test_short_queue_rejected() {
        let buf = attr_bytes(TCA_STATS_QUEUE, &[0u8; 12]);
        assert!(decode_stats(&buf).is_err());
    }

    #[test]
    fn test_read_block_short_data() {
        let err = read_block::<GnetStatsQueue>(TCA_STATS_QUEUE, &[0u8; 12]).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedAttribute {
                kind: TCA_STATS_QUEUE,
                len: 12,
                min: 20
            }
        ));
    }

    #[test]
    fn test_unknown_tag_ignored() {
        // TCA_STATS_APP is not decoded but must not fail
        let buf = attr_bytes(crate::types::TCA_STATS_APP, &[1, 2, 3, 4]);
        let stats = decode_stats(&buf).unwrap();
        assert_eq!(stats, ActionStats::default());
    }
}
