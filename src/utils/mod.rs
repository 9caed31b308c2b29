//! # Utility Functions and Types
//!
//! This module provides common utility functions and types used throughout
//! the tsmon library.
//!
//! ## CRC Calculation
//!
//! The crc module provides MPEG-2 CRC32 calculation:
//!
//! ```rust
//! use tsmon::utils::Crc32Mpeg2;
//!
//! # fn main() {
//! let crc = Crc32Mpeg2::new();
//! let checksum = crc.calculate(b"section bytes");
//! println!("CRC32: {:08x}", checksum);
//! # }
//! ```

/// CRC calculation implementations
pub mod crc;

// Re-export commonly used types
pub use crc::Crc32Mpeg2;
