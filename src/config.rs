//! Monitor session configuration.
//!
//! Values come from defaults, then environment variables, then whatever the
//! caller (usually a CLI binary) sets explicitly.

use std::env;
use std::time::Duration;

/// Configuration of one monitoring session.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// TS packet size in bytes. 188 for plain transport streams.
    pub packet_size: usize,
    /// Interval between statistics snapshots.
    pub snapshot_interval: Duration,
    /// Suppress continuity-counter errors for this long after the first
    /// observed packet. `None` disables the startup grace.
    pub cc_grace: Option<Duration>,
    /// When true, snapshot emission is gated on observed packet timestamps
    /// instead of the wallclock timer (file and PCAP replay).
    pub synthetic_time: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            packet_size: 188,
            snapshot_interval: Duration::from_secs(1),
            cc_grace: Some(Duration::from_millis(500)),
            synthetic_time: false,
        }
    }
}

impl MonitorConfig {
    /// Builds a configuration from defaults overridden by environment
    /// variables `TSMON_SNAPSHOT_INTERVAL_S` and `TSMON_CC_GRACE_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(s) = env::var("TSMON_SNAPSHOT_INTERVAL_S") {
            if let Ok(secs) = s.parse::<u64>() {
                config.snapshot_interval = Duration::from_secs(secs.max(1));
            }
        }
        if let Ok(s) = env::var("TSMON_CC_GRACE_MS") {
            if let Ok(ms) = s.parse::<u64>() {
                config.cc_grace = if ms == 0 {
                    None
                } else {
                    Some(Duration::from_millis(ms))
                };
            }
        }
        config
    }
}
