//! Small-buffer values: addresses, credentials and session ids.
//!
//! On the wire each of these is a length byte followed by that many bytes.
//! The owned types below enforce the 1..=255 length range at construction,
//! so an encoded value can never overflow its length byte. An empty buffer
//! is reserved as the rejection signal of SESSION and IDENTIFY replies and
//! is modelled by [`crate::Reply::Rejected`] instead.

use std::fmt;

use bytes::{BufMut, Bytes};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{ProtocolError, Result};

/// Largest value a small buffer can carry
pub const MAX_SMALL_BUFFER: usize = u8::MAX as usize;

fn check_len(field: &'static str, len: usize) -> Result<()> {
    if len == 0 || len > MAX_SMALL_BUFFER {
        return Err(ProtocolError::InvalidLength { field, len });
    }
    Ok(())
}

/// Opaque routable endpoint identifier (1..=255 bytes, byte-exact equality)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Bytes);

impl Address {
    /// Wrap raw bytes as an address.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        check_len("address", bytes.len())?;
        Ok(Self(bytes))
    }

    /// Raw address bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes (always 1..=255)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Addresses are never empty; provided for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&str> for Address {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Server-assigned identifier correlating handshake steps on one connection
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Bytes);

impl SessionId {
    /// Wrap raw bytes as a session id.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        check_len("session id", bytes.len())?;
        Ok(Self(bytes))
    }

    /// Raw session id bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&str> for SessionId {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Opaque authentication token.
///
/// The bytes are wiped when the value is dropped and never appear in
/// `Debug` output. Credentials hash by content, so tables can key on the
/// credential itself and every stored copy is wiped with its entry.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(Vec<u8>);

impl Credential {
    /// Wrap raw bytes as a credential.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if let Err(err) = check_len("credential", bytes.len()) {
            let mut bytes = bytes;
            bytes.zeroize();
            return Err(err);
        }
        Ok(Self(bytes))
    }

    /// Raw credential bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&str> for Credential {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value.as_bytes().to_vec())
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl ZeroizeOnDrop for Credential {}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes redacted>)", self.0.len())
    }
}

pub(crate) fn put_small_buffer(dst: &mut impl BufMut, bytes: &[u8]) {
    debug_assert!(bytes.len() <= MAX_SMALL_BUFFER);
    dst.put_u8(bytes.len() as u8);
    dst.put_slice(bytes);
}

pub(crate) fn take<'a>(src: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if src.len() < len {
        return Err(ProtocolError::Incomplete { needed: len - src.len() });
    }
    let (head, rest) = src.split_at(len);
    *src = rest;
    Ok(head)
}

pub(crate) fn take_u8(src: &mut &[u8]) -> Result<u8> {
    Ok(take(src, 1)?[0])
}

pub(crate) fn take_array<const N: usize>(src: &mut &[u8]) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(src, N)?);
    Ok(out)
}

pub(crate) fn take_small_buffer<'a>(src: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = usize::from(take_u8(src)?);
    take(src, len)
}
