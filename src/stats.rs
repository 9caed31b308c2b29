//! # Statistics Engine
//!
//! Per-PID counters and the temporal detectors of ETSI TR 101 290
//! (first and second priority), fed by the demultiplexer's
//! `onPacketDecoded` channel and drained by periodic snapshots.
//!
//! The engine is driven from two sides: the producer thread updates
//! counters per packet, and a timer task requests interval snapshots.
//! Callers serialise access with a single mutex around the engine. Under
//! synthetic time (file and PCAP replay) the wallclock timer is bypassed
//! and snapshots are emitted whenever the observed packet timestamps cross
//! the interval boundary; both paths produce identical delta accounting.

use crate::config::MonitorConfig;
use crate::event::Event;
use crate::report::{PidCounters, PidSnapshot, SessionTimes, Snapshot, SnapshotKind};
use crate::ts::demuxer::PacketEvent;
use crate::ts::{ProgramRegistry, PID_NULL, SYNC_BYTE, TABLE_ID_CAT, TABLE_ID_PAT, TABLE_ID_PMT};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Maximum interval between PATs (and PMTs) before the indicator fires.
const TABLE_INTERVAL_MS: i64 = 500;
/// Maximum gap between packets of one PID.
const PID_GAP_S: i64 = 5;
/// PCR interval above which the discontinuity indicator must be set.
const PCR_DISCONTINUITY_MS: i64 = 100;
/// PCR interval above which repetition is flagged.
const PCR_REPETITION_MS: i64 = 40;
/// Maximum PTS repetition period.
const PTS_INTERVAL_MS: i64 = 700;

/// Per-PID statistics: the counters plus the temporal state the detectors
/// need between packets.
#[derive(Debug, Clone, Default)]
pub struct PidStat {
    /// Running totals for this PID
    pub counters: PidCounters,
    last_pat_dt: Option<DateTime<Utc>>,
    last_pmt_dt: Option<DateTime<Utc>>,
    last_seen_dt: Option<DateTime<Utc>>,
    last_pcr_dt: Option<DateTime<Utc>>,
    last_pts_dt: Option<DateTime<Utc>>,
    last_cc: Option<u8>,
    cc_repeated: bool,
}

/// Which table a registry update delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSeen {
    /// A PAT was installed or replaced
    Pat,
    /// A PMT was installed or replaced
    Pmt,
    /// A CAT was installed or replaced
    Cat,
    /// The program SDT was installed
    Sdt,
}

/// The statistics engine.
///
/// Holds per-PID [`PidStat`] entries keyed by PID, the previous-snapshot
/// baselines for delta accounting, session bookkeeping timestamps and its
/// own copy of the program registry (taken at table receipt, so the
/// producer thread can keep mutating the demuxer's registry).
pub struct Statistics {
    interval: Duration,
    packet_bits: u64,
    synthetic_time: bool,
    cc_grace: Option<Duration>,

    stats: BTreeMap<u16, PidStat>,
    prev: BTreeMap<u16, PidCounters>,
    program_prev: PidCounters,

    first_pk_dt: Option<DateTime<Utc>>,
    last_dt: Option<DateTime<Utc>>,
    current_dt: Option<DateTime<Utc>>,

    /// When monitoring started
    pub monitoring_start_dt: Option<DateTime<Utc>>,
    /// When monitoring ended
    pub monitoring_end_dt: Option<DateTime<Utc>>,
    /// First PAT receipt
    pub pat_received_dt: Option<DateTime<Utc>>,
    /// First PMT receipt
    pub pmt_received_dt: Option<DateTime<Utc>>,
    /// First CAT receipt
    pub cat_received_dt: Option<DateTime<Utc>>,
    /// First program SDT receipt
    pub sdt_received_dt: Option<DateTime<Utc>>,

    programs: ProgramRegistry,

    /// Fired for each interval snapshot
    pub on_stat_ready: Event<Snapshot>,
    /// Fired once for the final snapshot
    pub on_final_stat_ready: Event<Snapshot>,
}

impl Statistics {
    /// Creates an engine for the given session configuration.
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            interval: Duration::from_std(config.snapshot_interval)
                .unwrap_or_else(|_| Duration::seconds(1)),
            packet_bits: (config.packet_size * 8) as u64,
            synthetic_time: config.synthetic_time,
            cc_grace: config
                .cc_grace
                .and_then(|g| Duration::from_std(g).ok()),
            stats: BTreeMap::new(),
            prev: BTreeMap::new(),
            program_prev: PidCounters::default(),
            first_pk_dt: None,
            last_dt: None,
            current_dt: None,
            monitoring_start_dt: None,
            monitoring_end_dt: None,
            pat_received_dt: None,
            pmt_received_dt: None,
            cat_received_dt: None,
            sdt_received_dt: None,
            programs: ProgramRegistry::new(),
            on_stat_ready: Event::new("onStatReady"),
            on_final_stat_ready: Event::new("onFinalStatReady"),
        }
    }

    /// Arrival time of the first framed packet, if any.
    pub fn first_pk_dt(&self) -> Option<DateTime<Utc>> {
        self.first_pk_dt
    }

    /// The engine's snapshot copy of the program registry.
    pub fn programs(&self) -> &ProgramRegistry {
        &self.programs
    }

    /// Running totals for one PID, if it was ever seen.
    pub fn pid_counters(&self, pid: u16) -> Option<&PidCounters> {
        self.stats.get(&pid).map(|s| &s.counters)
    }

    /// Takes a fresh copy of the registry on table receipt and records the
    /// first-receipt timestamp of the table kind.
    pub fn update_programs_info(
        &mut self,
        dt: DateTime<Utc>,
        registry: &ProgramRegistry,
        table: TableSeen,
    ) {
        self.programs = registry.clone();
        match table {
            TableSeen::Pat => self.pat_received_dt.get_or_insert(dt),
            TableSeen::Pmt => self.pmt_received_dt.get_or_insert(dt),
            TableSeen::Cat => self.cat_received_dt.get_or_insert(dt),
            TableSeen::Sdt => self.sdt_received_dt.get_or_insert(dt),
        };
    }

    /// Folds one decoded packet into the counters, running every detector.
    pub fn update_stat(&mut self, event: &PacketEvent) {
        let dpk = &event.packet;
        let dt = dpk.dt;
        let first_pk_dt = *self.first_pk_dt.get_or_insert(dt);

        let stat = self.stats.entry(dpk.pid).or_default();

        stat.counters.packet_count += 1;
        if dpk.scrambling_control != 0 {
            stat.counters.scrambled_count += 1;
        }
        if event.resync != 0 {
            stat.counters.ts_sync_loss += 1;
        }
        if dpk.sync_byte != SYNC_BYTE {
            stat.counters.sync_byte_error += 1;
        }

        // PAT_error: a PAT repeated later than 500 ms, scrambled, or with
        // a wrong table_id. The first PAT only arms the timestamp.
        if let Some(pat) = &event.pat {
            if let Some(last) = stat.last_pat_dt {
                if last + Duration::milliseconds(TABLE_INTERVAL_MS) < dt
                    || dpk.scrambling_control != 0
                    || pat.table_id != TABLE_ID_PAT
                {
                    stat.counters.pat_error += 1;
                }
            }
            stat.last_pat_dt = Some(dt);
        }

        // CC_errors: not on null packets, and only when the packet carries
        // a payload. One repeated CC is tolerated; the second consecutive
        // duplicate or any non-increment counts.
        if dpk.pid != PID_NULL && dpk.has_payload() {
            if let Some(last_cc) = stat.last_cc {
                if last_cc == dpk.continuity_counter {
                    if stat.cc_repeated {
                        stat.cc_repeated = false;
                        if consume_cc_grace(&mut self.cc_grace, first_pk_dt, dt) {
                            stat.counters.cc_errors += 1;
                        }
                    } else {
                        stat.cc_repeated = true;
                    }
                } else if (last_cc + 1) & 0x0F != dpk.continuity_counter
                    && consume_cc_grace(&mut self.cc_grace, first_pk_dt, dt)
                {
                    stat.counters.cc_errors += 1;
                }
            }
            stat.last_cc = Some(dpk.continuity_counter);
        }

        // PMT_error: same interval rule as the PAT, on the PMT's PID.
        if let Some(pmt) = &event.pmt {
            if let Some(last) = stat.last_pmt_dt {
                if last + Duration::milliseconds(TABLE_INTERVAL_MS) < dt
                    || dpk.scrambling_control != 0
                    || pmt.table_id != TABLE_ID_PMT
                {
                    stat.counters.pmt_error += 1;
                }
            }
            stat.last_pmt_dt = Some(dt);
        }

        // PID_error: the PID went silent for more than 5 s.
        if let Some(last) = stat.last_seen_dt {
            if last + Duration::seconds(PID_GAP_S) < dt {
                stat.counters.pid_error += 1;
            }
        }
        stat.last_seen_dt = Some(dt);

        if dpk.transport_error {
            stat.counters.transport_error += 1;
        }

        if event.crc32_ok == Some(false) {
            stat.counters.crc_error += 1;
        }

        // PCR detectors, on PCR PIDs only. Above 100 ms without the
        // discontinuity indicator it is a discontinuity error; above 40 ms
        // a repetition error; never both.
        if event.is_pcr_pid {
            if let Some(last) = stat.last_pcr_dt {
                if last + Duration::milliseconds(PCR_DISCONTINUITY_MS) < dt
                    && !dpk.discontinuity()
                {
                    stat.counters.pcr_discontinuity_indicator_error += 1;
                } else if last + Duration::milliseconds(PCR_REPETITION_MS) < dt {
                    stat.counters.pcr_repetition_error += 1;
                }
            }
            stat.last_pcr_dt = Some(dt);
        }

        // PTS_error: a PES header with a PTS arriving more than 700 ms
        // after the previous one on this PID.
        if let Some(pes) = &event.pes {
            if let Some(last) = stat.last_pts_dt {
                if pes.pts.is_some() && last + Duration::milliseconds(PTS_INTERVAL_MS) < dt {
                    stat.counters.pts_error += 1;
                }
            }
            stat.last_pts_dt = Some(dt);
        }

        if let Some(cat) = &event.cat {
            if cat.table_id != TABLE_ID_CAT {
                stat.counters.cat_error += 1;
            }
        }

        // Under synthetic time the packet timestamps gate snapshot
        // emission instead of the wallclock timer.
        self.current_dt = Some(dt);
        match self.last_dt {
            None => self.last_dt = Some(dt),
            Some(last) if self.synthetic_time && last + self.interval < dt => {
                let snapshot = self.generate(SnapshotKind::Interval);
                self.on_stat_ready.fire(&snapshot);
            }
            _ => {}
        }
    }

    /// Produces an interval snapshot and fires `onStatReady`.
    ///
    /// Called by the wallclock timer task; harmless to call before any
    /// packet arrived (the snapshot then carries `has_errors = -1`).
    pub fn interval_tick(&mut self) -> Snapshot {
        let snapshot = self.generate(SnapshotKind::Interval);
        self.on_stat_ready.fire(&snapshot);
        snapshot
    }

    /// Emits the closing interval snapshot and the final snapshot, firing
    /// `onStatReady` and `onFinalStatReady`.
    pub fn finalize(&mut self) -> Snapshot {
        let closing = self.generate(SnapshotKind::Interval);
        self.on_stat_ready.fire(&closing);
        let snapshot = self.generate(SnapshotKind::Final);
        self.on_final_stat_ready.fire(&snapshot);
        snapshot
    }

    fn generate(&mut self, kind: SnapshotKind) -> Snapshot {
        let is_final = kind == SnapshotKind::Final;
        let session = if is_final {
            Some(SessionTimes {
                monitoring_start_dt: self.monitoring_start_dt,
                monitoring_end_dt: self.monitoring_end_dt,
                first_pk_dt: self.first_pk_dt,
                pat_received_dt: self.pat_received_dt,
                pmt_received_dt: self.pmt_received_dt,
            })
        } else {
            None
        };

        if self.stats.is_empty() {
            return Snapshot {
                kind,
                dt: if is_final { None } else { Some(Utc::now()) },
                session,
                has_errors: -1,
                program_bitrate: None,
                program_stat: None,
                pids: Vec::new(),
            };
        }

        // The final snapshot reports totals since the first packet.
        if is_final {
            self.prev.clear();
            self.program_prev = PidCounters::default();
        }

        let mut program = PidCounters::default();
        for stat in self.stats.values() {
            program.accumulate(&stat.counters);
        }
        let program_delta = program.delta(&self.program_prev);
        let has_errors = program_delta.any_errors();

        let current_dt = self.current_dt.unwrap_or_else(Utc::now);
        let reference = if is_final {
            self.first_pk_dt.unwrap_or(current_dt)
        } else {
            self.last_dt.unwrap_or(current_dt)
        };
        // Clamped so a sub-second session cannot inflate bitrates.
        let time_delta = ((current_dt - reference).num_milliseconds() as f64 / 1000.0).max(1.0);

        let pids = self
            .stats
            .iter()
            .map(|(&pid, stat)| {
                let prev = self.prev.get(&pid).copied().unwrap_or_default();
                let delta = stat.counters.delta(&prev);
                PidSnapshot {
                    pid,
                    bitrate: bitrate(delta.packet_count, self.packet_bits, time_delta),
                    stat: (has_errors || is_final).then_some(delta),
                }
            })
            .collect();

        let snapshot = Snapshot {
            kind,
            dt: if is_final { None } else { Some(current_dt) },
            session,
            has_errors: has_errors as i8,
            program_bitrate: Some(bitrate(program_delta.packet_count, self.packet_bits, time_delta)),
            program_stat: (has_errors || is_final).then_some(program_delta),
            pids,
        };

        self.prev = self
            .stats
            .iter()
            .map(|(&pid, stat)| (pid, stat.counters))
            .collect();
        self.program_prev = program;
        self.last_dt = Some(current_dt);

        snapshot
    }
}

/// Decides whether a CC error counts, honouring the startup grace: errors
/// inside the window are suppressed; the first detection after the window
/// counts and disables the grace for the rest of the session.
fn consume_cc_grace(
    grace: &mut Option<Duration>,
    first_pk_dt: DateTime<Utc>,
    dt: DateTime<Utc>,
) -> bool {
    match *grace {
        None => true,
        Some(window) => {
            if first_pk_dt + window < dt {
                *grace = None;
                true
            } else {
                false
            }
        }
    }
}

fn bitrate(packets: u64, packet_bits: u64, time_delta: f64) -> u64 {
    ((packets * packet_bits) as f64 / time_delta).round() as u64
}
