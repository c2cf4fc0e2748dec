//! Error types for the FAST wire codec.
//!
//! Decoding distinguishes "not enough bytes yet" ([`ProtocolError::Incomplete`])
//! from malformed input so that stream readers can keep accumulating bytes
//! instead of failing on a partially received frame.

use thiserror::Error;

/// Codec-level errors raised while encoding or decoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input ended before a complete frame could be decoded
    #[error("incomplete frame: need {needed} more bytes")]
    Incomplete {
        /// Minimum number of additional bytes required to make progress
        needed: usize,
    },

    /// Connection header does not start with the `FAST` magic
    #[error("invalid connection header magic: {found:02x?}")]
    InvalidMagic {
        /// The four bytes found where the magic was expected
        found: [u8; 4],
    },

    /// Connection header carries a protocol version we do not speak
    #[error("unsupported protocol version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version byte
        major: u8,
        /// Minor version byte
        minor: u8,
    },

    /// A small buffer (address, credential, session id) has an invalid length
    #[error("invalid {field} length: {len} (expected 1..=255)")]
    InvalidLength {
        /// Which field was being decoded or constructed
        field: &'static str,
        /// Offending length
        len: usize,
    },

    /// Packet payload exceeds [`crate::MAX_PAYLOAD_SIZE`]
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Actual payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// A frame exceeds [`crate::MAX_FRAME_SIZE`]
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Frame size known so far
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// A SEND frame would carry more packets than its count byte can express
    #[error("too many packets for one SEND frame: {count} (max {max})")]
    TooManyPackets {
        /// Number of packets requested
        count: usize,
        /// Maximum packets per frame
        max: usize,
    },
}

impl ProtocolError {
    /// Whether more input could turn this error into a successful decode.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}

/// Convenient Result type alias for codec operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
