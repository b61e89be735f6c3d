//! Error types for the P3 codec.
//!
//! Decode errors are reserved for inputs the codec cannot make sense of at
//! all (truncated frames, truncated fixed-layout payloads). Soft failures
//! like a bad CRC or an unknown type byte are NOT errors: they decode fine
//! and are reported through [`crate::Packet::is_valid`], because the usual
//! response is a NAK rather than a bail-out.

use thiserror::Error;

/// Errors produced while encoding or decoding P3 wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input shorter than the 9-byte minimum frame (header + msg_end).
    #[error("packet too small: {actual} bytes, need at least 9")]
    PacketTooShort {
        /// Number of bytes actually supplied
        actual: usize,
    },

    /// Fixed-layout payload shorter than its declared size.
    #[error("payload too small: {actual} bytes, need at least {expected}")]
    PayloadTooShort {
        /// Minimum number of bytes the payload layout requires
        expected: usize,
        /// Number of bytes actually supplied
        actual: usize,
    },

    /// Payload longer than the 16-bit length field can carry.
    #[error("payload too large: {size} bytes exceeds {max}")]
    PayloadTooLarge {
        /// Size of the offending payload
        size: usize,
        /// Maximum encodable payload size
        max: usize,
    },
}

/// Convenience alias used throughout the codec.
pub type Result<T> = std::result::Result<T, ProtocolError>;
