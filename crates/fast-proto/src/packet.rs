//! Addressed packets.
//!
//! Layout on the wire (big-endian):
//!
//! ```text
//! ┌──────────────┬──────────────┬────────────┬────────────┬─────────┐
//! │ timestamp i64│ from (sbuf)  │ to (sbuf)  │ length u32 │ payload │
//! └──────────────┴──────────────┴────────────┴────────────┴─────────┘
//! ```

use bytes::{BufMut, Bytes};

use crate::{
    Address,
    buffer::{put_small_buffer, take, take_array, take_small_buffer},
    errors::{ProtocolError, Result},
};

/// Maximum payload size accepted in a single packet (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// An addressed message. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    timestamp: i64,
    from: Address,
    to: Address,
    payload: Bytes,
}

impl Packet {
    /// Build a packet. `timestamp` is milliseconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    /// [`MAX_PAYLOAD_SIZE`].
    pub fn new(timestamp: i64, from: Address, to: Address, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge { size: payload.len(), max: MAX_PAYLOAD_SIZE });
        }
        Ok(Self { timestamp, from, to, payload })
    }

    /// Milliseconds since the Unix epoch, as stamped by the sender
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Sender address
    pub fn from(&self) -> &Address {
        &self.from
    }

    /// Recipient address
    pub fn to(&self) -> &Address {
        &self.to
    }

    /// Application payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// A packet addressed to its own sender
    pub fn is_echo(&self) -> bool {
        self.from == self.to
    }

    /// Number of bytes [`Packet::encode`] writes
    pub fn encoded_len(&self) -> usize {
        8 + 1 + self.from.len() + 1 + self.to.len() + 4 + self.payload.len()
    }

    /// Append the packet frame to `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i64(self.timestamp);
        put_small_buffer(dst, self.from.as_bytes());
        put_small_buffer(dst, self.to.as_bytes());
        dst.put_u32(self.payload.len() as u32);
        dst.put_slice(&self.payload);
    }

    /// Decode one packet frame from the front of `src`, advancing it.
    ///
    /// The payload length is checked against [`MAX_PAYLOAD_SIZE`] before
    /// any payload bytes are copied. On error `src` may be partially
    /// consumed; callers decode from a scratch cursor.
    pub fn decode(src: &mut &[u8]) -> Result<Self> {
        let timestamp = i64::from_be_bytes(take_array(src)?);
        let from = Address::new(Bytes::copy_from_slice(take_small_buffer(src)?))?;
        let to = Address::new(Bytes::copy_from_slice(take_small_buffer(src)?))?;
        let len = u32::from_be_bytes(take_array(src)?) as usize;
        if len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge { size: len, max: MAX_PAYLOAD_SIZE });
        }
        let payload = Bytes::copy_from_slice(take(src, len)?);
        Ok(Self { timestamp, from, to, payload })
    }
}
