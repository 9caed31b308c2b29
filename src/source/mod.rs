//! # Input Sources
//!
//! Thin framing layers feeding the demultiplexer: UDP multicast datagrams,
//! raw TS files and PCAP captures. Each source yields timestamped byte
//! chunks; everything downstream of the chunk boundary is the
//! demultiplexer's business.

use crate::error::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// UDP multicast input
pub mod multicast;
/// Raw TS file input
pub mod file;
/// PCAP capture input
pub mod pcap;

/// One chunk of stream bytes with its arrival (or capture) timestamp.
#[derive(Debug, Clone)]
pub struct SourceChunk {
    /// The raw bytes, a whole number of TS packets in well-formed inputs
    pub data: Bytes,
    /// Arrival timestamp for live sources, capture timestamp for files
    pub dt: DateTime<Utc>,
}

/// A producer of stream chunks.
///
/// Only the read suspends; the caller drives demultiplexing synchronously
/// between reads. `Ok(None)` signals a clean end of input: end of file, or
/// the receive timeout on a live socket.
#[async_trait::async_trait]
pub trait PacketSource: Send {
    /// Reads the next chunk, `None` at end of input.
    async fn next_chunk(&mut self) -> Result<Option<SourceChunk>>;
}

pub use file::FileSource;
pub use multicast::MulticastSource;
pub use pcap::PcapSource;
