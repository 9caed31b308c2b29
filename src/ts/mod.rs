//! # MPEG Transport Stream demultiplexing
//!
//! This module provides the streaming core of the monitor:
//!
//! - TS packet framing with resynchronisation
//! - Packet header and adaptation field decoding
//! - PSI/SI section reassembly across packet boundaries
//! - PAT/PMT/CAT/SDT/BAT table decoding with CRC-32/MPEG-2 verification
//! - PES header detection on elementary-stream PIDs
//! - Program topology tracking across versioned table updates
//!
//! The [`demuxer::TSDemuxer`] ties the pieces together: bytes pushed into
//! it are framed, decoded, routed by PID, reflected into the
//! [`registry::ProgramRegistry`], and published on the demuxer's event
//! channels.

/// Descriptor decoding for PSI/SI descriptor loops
pub mod descriptor;
/// The PID router and event publisher
pub mod demuxer;
/// Packet boundary location and resynchronisation
pub mod framer;
/// TS packet header and adaptation field decoding
pub mod packet;
/// PES header detection and decoding
pub mod pes;
/// Program topology derived from the installed tables
pub mod registry;
/// Multi-packet section reassembly
pub mod section;
/// PSI/SI table types and section decoders
pub mod tables;

// Constants

/// Size of a Transport Stream packet in bytes
pub const TS_PACKET_SIZE: usize = 188;
/// Size of the fixed Transport Stream header in bytes
pub const TS_HEADER_SIZE: usize = 4;
/// Sync byte opening every TS packet
pub const SYNC_BYTE: u8 = 0x47;

/// PID carrying the Program Association Table (PAT)
pub const PID_PAT: u16 = 0x0000;
/// PID carrying the Conditional Access Table (CAT)
pub const PID_CAT: u16 = 0x0001;
/// PID carrying SDT, BAT and stuffing tables
pub const PID_SDT: u16 = 0x0011;
/// Null packet PID, exempt from continuity checking
pub const PID_NULL: u16 = 0x1FFF;

/// Table ID of the Program Association Table
pub const TABLE_ID_PAT: u8 = 0x00;
/// Table ID of the Conditional Access Table
pub const TABLE_ID_CAT: u8 = 0x01;
/// Table ID of the Program Map Table
pub const TABLE_ID_PMT: u8 = 0x02;
/// Table ID of the Service Description Table for the actual transport stream
pub const TABLE_ID_SDT_ACTUAL: u8 = 0x42;
/// Table ID of the Service Description Table for another transport stream
pub const TABLE_ID_SDT_OTHER: u8 = 0x46;
/// Table ID of the Bouquet Association Table
pub const TABLE_ID_BAT: u8 = 0x4A;

// Re-export commonly used types
pub use demuxer::TSDemuxer;
pub use framer::{Framed, Framer};
pub use packet::{AdaptationField, TSPacket, TSPacketParser};
pub use pes::PESHeader;
pub use registry::ProgramRegistry;
pub use tables::{BAT, CAT, PAT, PMT, SDT};
