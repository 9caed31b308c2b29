#![doc(html_root_url = "https://docs.rs/tsmon/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsmon - MPEG-TS Quality-of-Service Monitor
//!
//! `tsmon` ingests MPEG-2 Transport Stream byte flows, either from UDP
//! multicast or from capture files, and produces a continuous per-PID
//! quality-of-service report compliant with the ETSI TR 101 290 first and
//! second priority indicators.
//!
//! ## Features
//!
//! ### Streaming demultiplexer
//! - Packet re-synchronisation and 188-byte framing
//! - TS header and adaptation field decoding (PCR/OPCR, splicing,
//!   private data)
//! - PSI/SI section reassembly across packets with CRC-32/MPEG-2
//!   verification
//! - PAT, PMT, CAT, SDT and BAT decoding; PES header detection
//! - Program topology tracking across versioned table updates
//!
//! ### Statistics engine
//! - The fourteen ETSI TR 101 290 counters per PID and per program
//! - Timer-driven interval snapshots with delta accounting, or
//!   packet-timestamp gating for pre-recorded inputs
//! - Structured JSON snapshot records for presenters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsmon::config::MonitorConfig;
//! use tsmon::monitor::Monitor;
//! use chrono::Utc;
//!
//! let config = MonitorConfig::default();
//! let mut monitor = Monitor::new(&config);
//! monitor.stats().lock().on_stat_ready.subscribe(|snapshot| {
//!     println!("interval has_errors={}", snapshot.has_errors);
//! });
//!
//! // Feed datagrams as they arrive.
//! let datagram = [0u8; 7 * 188];
//! monitor.push(&datagram, Utc::now());
//!
//! let report = monitor.finalize(Utc::now());
//! println!("pids observed: {}", report.pids.len());
//! ```
//!
//! ## Module Overview
//!
//! - `ts`: the demultiplexing core: framer, packet decoder, section
//!   reassembler, table decoders, program registry and the PID router
//! - `stats`: per-PID counters, the ETSI detectors and snapshot
//!   generation
//! - `report`: snapshot record structures
//! - `source`: multicast, raw-file and PCAP input framing
//! - `monitor`: session wiring between demuxer, statistics and the timer
//! - `event`: named multicast callback channels
//! - `error`: error types and the crate-wide `Result`
//! - `utils`: CRC-32/MPEG-2

/// Monitor session configuration
pub mod config;

/// Error types and utilities
pub mod error;

/// Named event channels
pub mod event;

/// Session wiring of demuxer, statistics and timer
pub mod monitor;

/// Snapshot record structures
pub mod report;

/// Input sources (multicast, file, PCAP)
pub mod source;

/// Statistics engine with the ETSI TR 101 290 detectors
pub mod stats;

/// MPEG Transport Stream demultiplexing
pub mod ts;

/// Common utilities and helper functions
pub mod utils;

pub use error::{Result, TsmonError};
