//! Snapshot record structures.
//!
//! One [`Snapshot`] is produced per statistics interval plus one final
//! snapshot at session end. Records serialise to the structured JSON
//! consumed by presenters; counter fields keep their ETSI TR 101 290
//! names on the wire.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The fourteen ETSI TR 101 290 counters plus packet/scrambled counts.
///
/// Used both for running totals and for interval deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PidCounters {
    /// Packets seen
    #[serde(rename = "Packet_count")]
    pub packet_count: u64,
    /// Packets with a non-zero transport_scrambling_control
    #[serde(rename = "Scrambled_count")]
    pub scrambled_count: u64,
    /// Framer resynchronisations
    #[serde(rename = "TS_sync_loss")]
    pub ts_sync_loss: u64,
    /// Packets whose sync byte is not 0x47
    #[serde(rename = "Sync_byte_error")]
    pub sync_byte_error: u64,
    /// PAT repetition / scrambling / table_id violations
    #[serde(rename = "PAT_error")]
    pub pat_error: u64,
    /// Continuity counter violations
    #[serde(rename = "CC_errors")]
    pub cc_errors: u64,
    /// PMT repetition / scrambling / table_id violations
    #[serde(rename = "PMT_error")]
    pub pmt_error: u64,
    /// PID silent for longer than 5 s
    #[serde(rename = "PID_error")]
    pub pid_error: u64,
    /// Packets with the transport_error_indicator set
    #[serde(rename = "Transport_error")]
    pub transport_error: u64,
    /// Sections whose CRC-32/MPEG-2 check failed
    #[serde(rename = "CRC_error")]
    pub crc_error: u64,
    /// PCR interval above 40 ms
    #[serde(rename = "PCR_repetition_error")]
    pub pcr_repetition_error: u64,
    /// PCR interval above 100 ms without the discontinuity indicator
    #[serde(rename = "PCR_discontinuity_indicator_error")]
    pub pcr_discontinuity_indicator_error: u64,
    /// PTS interval above 700 ms
    #[serde(rename = "PTS_error")]
    pub pts_error: u64,
    /// Non-CAT table observed on PID 0x0001
    #[serde(rename = "CAT_error")]
    pub cat_error: u64,
}

impl PidCounters {
    /// Field-wise difference against an earlier reading.
    pub fn delta(&self, prev: &PidCounters) -> PidCounters {
        PidCounters {
            packet_count: self.packet_count - prev.packet_count,
            scrambled_count: self.scrambled_count - prev.scrambled_count,
            ts_sync_loss: self.ts_sync_loss - prev.ts_sync_loss,
            sync_byte_error: self.sync_byte_error - prev.sync_byte_error,
            pat_error: self.pat_error - prev.pat_error,
            cc_errors: self.cc_errors - prev.cc_errors,
            pmt_error: self.pmt_error - prev.pmt_error,
            pid_error: self.pid_error - prev.pid_error,
            transport_error: self.transport_error - prev.transport_error,
            crc_error: self.crc_error - prev.crc_error,
            pcr_repetition_error: self.pcr_repetition_error - prev.pcr_repetition_error,
            pcr_discontinuity_indicator_error: self.pcr_discontinuity_indicator_error
                - prev.pcr_discontinuity_indicator_error,
            pts_error: self.pts_error - prev.pts_error,
            cat_error: self.cat_error - prev.cat_error,
        }
    }

    /// Field-wise accumulation, used for the program aggregate.
    pub fn accumulate(&mut self, other: &PidCounters) {
        self.packet_count += other.packet_count;
        self.scrambled_count += other.scrambled_count;
        self.ts_sync_loss += other.ts_sync_loss;
        self.sync_byte_error += other.sync_byte_error;
        self.pat_error += other.pat_error;
        self.cc_errors += other.cc_errors;
        self.pmt_error += other.pmt_error;
        self.pid_error += other.pid_error;
        self.transport_error += other.transport_error;
        self.crc_error += other.crc_error;
        self.pcr_repetition_error += other.pcr_repetition_error;
        self.pcr_discontinuity_indicator_error += other.pcr_discontinuity_indicator_error;
        self.pts_error += other.pts_error;
        self.cat_error += other.cat_error;
    }

    /// True when any indicator other than the packet count is non-zero.
    pub fn any_errors(&self) -> bool {
        self.scrambled_count != 0
            || self.ts_sync_loss != 0
            || self.sync_byte_error != 0
            || self.pat_error != 0
            || self.cc_errors != 0
            || self.pmt_error != 0
            || self.pid_error != 0
            || self.transport_error != 0
            || self.crc_error != 0
            || self.pcr_repetition_error != 0
            || self.pcr_discontinuity_indicator_error != 0
            || self.pts_error != 0
            || self.cat_error != 0
    }
}

/// Whether a snapshot closes an interval or the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Periodic snapshot carrying deltas since the previous one
    Interval,
    /// Session-final snapshot carrying totals since the first packet
    Final,
}

/// Session timestamps attached to the final snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionTimes {
    /// When monitoring started
    pub monitoring_start_dt: Option<DateTime<Utc>>,
    /// When monitoring ended
    pub monitoring_end_dt: Option<DateTime<Utc>>,
    /// Arrival of the first framed packet
    pub first_pk_dt: Option<DateTime<Utc>>,
    /// First PAT receipt
    pub pat_received_dt: Option<DateTime<Utc>>,
    /// First PMT receipt
    pub pmt_received_dt: Option<DateTime<Utc>>,
}

/// Per-PID entry of a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PidSnapshot {
    /// The PID
    pub pid: u16,
    /// Bits per second over the snapshot's time delta
    pub bitrate: u64,
    /// Delta counters; present when the snapshot has errors or is final
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<PidCounters>,
}

/// One statistics snapshot.
///
/// `has_errors` is 1 when any indicator moved during the interval, 0 when
/// none did, and -1 for a snapshot generated before any packet was seen
/// (the "no multicast" marker).
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Interval or final
    pub kind: SnapshotKind,
    /// Timestamp of the latest packet folded into this snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dt: Option<DateTime<Utc>>,
    /// Session timestamps, on the final snapshot only
    #[serde(flatten)]
    pub session: Option<SessionTimes>,
    /// 1, 0 or -1, see above
    pub has_errors: i8,
    /// Aggregate bitrate across all PIDs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_bitrate: Option<u64>,
    /// Aggregate delta counters; present when has_errors or final
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_stat: Option<PidCounters>,
    /// Per-PID bitrates and deltas
    pub pids: Vec<PidSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_and_accumulate_are_inverse() {
        let mut a = PidCounters {
            packet_count: 10,
            cc_errors: 2,
            ..Default::default()
        };
        let b = PidCounters {
            packet_count: 4,
            cc_errors: 1,
            ..Default::default()
        };
        let d = a.delta(&b);
        assert_eq!(d.packet_count, 6);
        assert_eq!(d.cc_errors, 1);

        a = b;
        a.accumulate(&d);
        assert_eq!(a.packet_count, 10);
        assert_eq!(a.cc_errors, 2);
    }

    #[test]
    fn test_any_errors_ignores_packet_count() {
        let clean = PidCounters {
            packet_count: 1000,
            ..Default::default()
        };
        assert!(!clean.any_errors());

        let scrambled = PidCounters {
            scrambled_count: 1,
            ..Default::default()
        };
        assert!(scrambled.any_errors());
    }

    #[test]
    fn test_counter_names_serialise_as_etsi() {
        let json = serde_json::to_value(PidCounters::default()).unwrap();
        assert!(json.get("Packet_count").is_some());
        assert!(json.get("PCR_discontinuity_indicator_error").is_some());
        assert!(json.get("CC_errors").is_some());
    }
}
