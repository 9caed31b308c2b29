//! # Error Types
//!
//! This module provides the error types used throughout the tsmon library.
//! It defines a central error type `TsmonError` that encapsulates all
//! possible errors that can occur while reading and analysing a transport
//! stream.
//!
//! Note that most anomalies in the monitored stream are NOT errors in this
//! sense: ETSI TR 101 290 indicators only increment counters, and tables
//! failing their CRC check are returned as decoded objects with
//! `crc32_ok = false`. `TsmonError` covers the cases where an operation
//! itself cannot proceed.
//!
//! ## Example Usage
//!
//! ```rust
//! use tsmon::error::{Result, TsmonError};
//!
//! fn decode_section(data: &[u8]) -> Result<()> {
//!     if data.is_empty() {
//!         return Err(TsmonError::Parser("empty section".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Primary error type for the tsmon library
#[derive(Error, Debug)]
pub enum TsmonError {
    /// I/O errors that occur during file or network operations
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Structural parse failures (malformed header, truncated section)
    #[error("parser error: {0}")]
    Parser(String),

    /// Errors for invalid or malformed input framing (bad PCAP header, etc.)
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Subscriber bookkeeping errors on the event bus; recoverable and
    /// never propagated into the packet path
    #[error("event error: {0}")]
    Event(String),

    /// Unrecoverable setup failures (socket bind, multicast join, CLI)
    #[error("setup error: {0}")]
    Setup(String),
}

/// A specialized Result type for tsmon operations.
///
/// This type is used throughout the tsmon library to handle operations
/// that can produce a `TsmonError`.
pub type Result<T> = std::result::Result<T, TsmonError>;
