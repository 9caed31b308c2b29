//! # Monitoring Session
//!
//! Wires the demultiplexer's event channels into the statistics engine
//! and owns the snapshot timer. The producer (a socket or file loop)
//! pushes chunks; the engine is shared behind a single mutex so the timer
//! task can snapshot concurrently.

use crate::config::MonitorConfig;
use crate::report::Snapshot;
use crate::stats::{Statistics, TableSeen};
use crate::ts::TSDemuxer;
use chrono::DateTime;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A demultiplexer and statistics engine wired together for one session.
pub struct Monitor {
    demuxer: TSDemuxer,
    stats: Arc<Mutex<Statistics>>,
    snapshot_interval: Duration,
    timer: Option<tokio::task::JoinHandle<()>>,
}

impl Monitor {
    /// Builds a session: the engine subscribes to `onPacketDecoded` and to
    /// every table channel it snapshots the registry from.
    pub fn new(config: &MonitorConfig) -> Self {
        let stats = Arc::new(Mutex::new(Statistics::new(config)));
        let mut demuxer = TSDemuxer::new();

        let sink = Arc::clone(&stats);
        demuxer
            .events
            .on_packet_decoded
            .subscribe(move |event| sink.lock().update_stat(event));

        let sink = Arc::clone(&stats);
        demuxer.events.on_pat_received.subscribe(move |event| {
            sink.lock()
                .update_programs_info(event.dt, &event.registry, TableSeen::Pat);
        });
        let sink = Arc::clone(&stats);
        demuxer.events.on_pmt_received.subscribe(move |event| {
            sink.lock()
                .update_programs_info(event.dt, &event.registry, TableSeen::Pmt);
        });
        let sink = Arc::clone(&stats);
        demuxer.events.on_cat_received.subscribe(move |event| {
            sink.lock()
                .update_programs_info(event.dt, &event.registry, TableSeen::Cat);
        });
        let sink = Arc::clone(&stats);
        demuxer.events.on_program_sdt_received.subscribe(move |event| {
            sink.lock()
                .update_programs_info(event.dt, &event.registry, TableSeen::Sdt);
        });

        Self {
            demuxer,
            stats,
            snapshot_interval: config.snapshot_interval,
            timer: None,
        }
    }

    /// The shared statistics engine, for subscribing to snapshot channels
    /// and setting session timestamps.
    pub fn stats(&self) -> &Arc<Mutex<Statistics>> {
        &self.stats
    }

    /// The demultiplexer, for subscribing to additional table channels.
    pub fn demuxer_mut(&mut self) -> &mut TSDemuxer {
        &mut self.demuxer
    }

    /// Pushes one chunk into the demultiplexer; statistics update on this
    /// thread before the call returns.
    pub fn push(&mut self, data: &[u8], dt: DateTime<Utc>) {
        self.demuxer.push(data, dt);
    }

    /// Starts the wallclock snapshot timer.
    ///
    /// Not used under synthetic time, where packet timestamps gate
    /// snapshot emission instead.
    pub fn start_timer(&mut self) {
        let stats = Arc::clone(&self.stats);
        let period = self.snapshot_interval;
        self.timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                stats.lock().interval_tick();
            }
        }));
    }

    /// Stops the timer and emits the final snapshot.
    pub fn finalize(&mut self, end_dt: DateTime<Utc>) -> Snapshot {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let mut stats = self.stats.lock();
        stats.monitoring_end_dt = Some(end_dt);
        stats.finalize()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
