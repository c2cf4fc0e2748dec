//! Connection header.
//!
//! The initiator opens every connection with the fixed six bytes
//! `'F' 'A' 'S' 'T' 0x01 0x00`. The responder validates them before parsing
//! any command; a mismatch terminates the connection.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Fixed 6-byte connection header
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ConnectionHeader {
    magic: [u8; 4],
    major: u8,
    minor: u8,
}

impl ConnectionHeader {
    /// Encoded size in bytes
    pub const SIZE: usize = 6;

    /// Protocol magic
    pub const MAGIC: [u8; 4] = *b"FAST";

    /// The header this implementation sends and accepts
    pub const CURRENT: Self = Self { magic: Self::MAGIC, major: 1, minor: 0 };

    /// Raw header bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Parse and validate a header from the front of `bytes`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Incomplete`] if fewer than [`Self::SIZE`] bytes
    /// - [`ProtocolError::InvalidMagic`] if the magic is not `FAST`
    /// - [`ProtocolError::UnsupportedVersion`] for any version but 1.0
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let (header, _) = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::Incomplete { needed: Self::SIZE.saturating_sub(bytes.len()) })?;
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.magic != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic { found: self.magic });
        }
        if (self.major, self.minor) != (Self::CURRENT.major, Self::CURRENT.minor) {
            return Err(ProtocolError::UnsupportedVersion { major: self.major, minor: self.minor });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn current_header_bytes() {
        assert_eq!(ConnectionHeader::CURRENT.to_bytes(), hex!("46 41 53 54 01 00"));
    }

    #[test]
    fn accepts_current_header_with_trailing_bytes() {
        let bytes = hex!("46 41 53 54 01 00 01");
        assert_eq!(ConnectionHeader::from_bytes(&bytes), Ok(&ConnectionHeader::CURRENT));
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = *b"HTTP/1";
        assert_eq!(
            ConnectionHeader::from_bytes(&bytes),
            Err(ProtocolError::InvalidMagic { found: *b"HTTP" })
        );
    }

    #[test]
    fn rejects_other_versions() {
        let bytes = hex!("46 41 53 54 02 00");
        assert_eq!(
            ConnectionHeader::from_bytes(&bytes),
            Err(ProtocolError::UnsupportedVersion { major: 2, minor: 0 })
        );
    }

    #[test]
    fn short_input_is_incomplete() {
        assert_eq!(
            ConnectionHeader::from_bytes(b"FAS"),
            Err(ProtocolError::Incomplete { needed: 3 })
        );
    }
}
