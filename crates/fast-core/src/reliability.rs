//! Reliability engine: at-least-once delivery over one session.
//!
//! Each side keeps a ledger of how many packets it has sent and received
//! and buffers every sent packet until the peer acknowledges it:
//!
//! ```text
//!   sender                                   receiver
//!   ──────                                   ────────
//!   SEND p1, p2      ───────────────────>    received = 2
//!   REQUEST_ACK      ───────────────────>
//!                    <───────────────────    ACKNOWLEDGE(2)
//!   2 == sent: clear buffer
//! ```
//!
//! If the acknowledged count differs from the number of transmissions the
//! whole buffer is retransmitted and a new acknowledgment requested. There is
//! no selective retransmission and no acknowledgment timer: retransmission
//! happens only in response to an acknowledgment (or a FETCH from the peer).
//!
//! # Counting
//!
//! `sent` counts distinct packets, so `sent - unacknowledged.len()` is always
//! the number of packets known to be acknowledged. A retransmission does not
//! touch `sent`. The receiver counts every packet that arrives, duplicates
//! included, so acknowledgments are compared against `sent` plus the
//! retransmissions of this session:
//!
//! ```text
//!   sent 2, retransmitted 0   ACK(1)  -> mismatch, resend p1 p2
//!   sent 2, retransmitted 2   ACK(4)  -> match, buffer cleared
//!   acknowledged = 2 - 0 = 2
//! ```
//!
//! # Snapshot format
//!
//! ```text
//! ┌────────────┬─────────────┬─────────────┬────────────┬──────────────────────┐
//! │ version i32│ received i32│ sent i32    │ count i32  │ count × packet frame │
//! └────────────┴─────────────┴─────────────┴────────────┴──────────────────────┘
//! ```
//!
//! Unknown versions restore nothing. The retransmission count is not saved;
//! a restored ledger starts with none.

use bytes::{BufMut, Bytes};
use fast_proto::{Packet, ProtocolError};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::FastError;

/// Snapshot format version written by [`Reliability::save_state`]
pub const SNAPSHOT_VERSION: u32 = 1;

/// Effects requested by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReliabilityAction {
    /// Send these packets again, in order. The ledger has already counted
    /// them; they must not be recorded as new sends.
    Retransmit(Vec<Packet>),
    /// Send REQUEST_ACKNOWLEDGMENT
    RequestAcknowledgment,
    /// Send ACKNOWLEDGE with this count
    Acknowledge(u32),
}

/// Per-channel delivery ledger.
///
/// Pure state: the caller serializes access (one ledger per channel behind
/// a mutex) and executes the returned actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reliability {
    received: u32,
    sent: u32,
    retransmitted: u32,
    unacknowledged: Vec<Packet>,
}

#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct SnapshotHeader {
    version: [u8; 4],
    received: [u8; 4],
    sent: [u8; 4],
    unacknowledged: [u8; 4],
}

impl SnapshotHeader {
    const SIZE: usize = 16;
}

impl Reliability {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets received in this session
    pub fn received_count(&self) -> u32 {
        self.received
    }

    /// Distinct packets sent in this session
    pub fn sent_count(&self) -> u32 {
        self.sent
    }

    /// Packets sent and known to be acknowledged
    pub fn acknowledged_count(&self) -> u32 {
        self.sent.wrapping_sub(self.unacknowledged.len() as u32)
    }

    /// Packets put on the wire in this session, retransmissions included.
    ///
    /// This is the count a lossless peer acknowledges.
    pub fn transmitted_count(&self) -> u32 {
        self.sent.wrapping_add(self.retransmitted)
    }

    /// Packets awaiting acknowledgment, oldest first
    pub fn unacknowledged(&self) -> &[Packet] {
        &self.unacknowledged
    }

    /// Record a packet handed to the channel.
    pub fn on_packet_sent(&mut self, packet: Packet) {
        self.unacknowledged.push(packet);
        self.sent = self.sent.wrapping_add(1);
    }

    /// Record a packet delivered by the peer.
    pub fn on_packet_received(&mut self) {
        self.received = self.received.wrapping_add(1);
    }

    /// Answer a REQUEST_ACKNOWLEDGMENT.
    pub fn on_acknowledgment_requested(&self) -> Vec<ReliabilityAction> {
        vec![ReliabilityAction::Acknowledge(self.received)]
    }

    /// Process an ACKNOWLEDGE.
    ///
    /// A count equal to [`Self::transmitted_count`] clears the buffer.
    /// Anything else triggers one full retransmission of the buffer.
    pub fn on_acknowledgment_received(&mut self, count: u32) -> Vec<ReliabilityAction> {
        if count == self.transmitted_count() {
            self.unacknowledged.clear();
            return vec![];
        }
        self.flush()
    }

    /// Retransmit the whole buffer and request a fresh acknowledgment.
    ///
    /// No-op when nothing is waiting for acknowledgment.
    pub fn flush(&mut self) -> Vec<ReliabilityAction> {
        if self.unacknowledged.is_empty() {
            return vec![];
        }
        self.retransmitted = self.retransmitted.wrapping_add(self.unacknowledged.len() as u32);
        vec![
            ReliabilityAction::Retransmit(self.unacknowledged.clone()),
            ReliabilityAction::RequestAcknowledgment,
        ]
    }

    /// Zero the counters and drop the buffer. Called once per new session.
    pub fn reset(&mut self) {
        self.received = 0;
        self.sent = 0;
        self.retransmitted = 0;
        self.unacknowledged.clear();
    }

    /// Append a versioned snapshot of the ledger to `dst`.
    pub fn save_state(&self, dst: &mut impl BufMut) {
        let header = SnapshotHeader {
            version: SNAPSHOT_VERSION.to_be_bytes(),
            received: self.received.to_be_bytes(),
            sent: self.sent.to_be_bytes(),
            unacknowledged: (self.unacknowledged.len() as u32).to_be_bytes(),
        };
        dst.put_slice(header.as_bytes());
        for packet in &self.unacknowledged {
            packet.encode(dst);
        }
    }

    /// Snapshot into a fresh buffer.
    pub fn to_snapshot(&self) -> Bytes {
        let mut buf = Vec::with_capacity(
            SnapshotHeader::SIZE + self.unacknowledged.iter().map(Packet::encoded_len).sum::<usize>(),
        );
        self.save_state(&mut buf);
        Bytes::from(buf)
    }

    /// Replace the ledger with a snapshot written by [`Self::save_state`].
    ///
    /// Returns `false` and leaves the ledger untouched if the snapshot has
    /// an unknown version.
    ///
    /// # Errors
    ///
    /// [`FastError::Snapshot`] if the snapshot is truncated or contains an
    /// invalid packet. The ledger is left untouched.
    pub fn restore_state(&mut self, snapshot: &[u8]) -> Result<bool, FastError> {
        let (header, mut rest) = SnapshotHeader::ref_from_prefix(snapshot)
            .map_err(|_| FastError::Snapshot(format!("header needs {} bytes", SnapshotHeader::SIZE)))?;

        if u32::from_be_bytes(header.version) != SNAPSHOT_VERSION {
            return Ok(false);
        }

        let count = u32::from_be_bytes(header.unacknowledged) as usize;
        let mut unacknowledged = Vec::new();
        for index in 0..count {
            let packet = Packet::decode(&mut rest).map_err(|err: ProtocolError| {
                FastError::Snapshot(format!("packet {index} of {count}: {err}"))
            })?;
            unacknowledged.push(packet);
        }

        self.received = u32::from_be_bytes(header.received);
        self.sent = u32::from_be_bytes(header.sent);
        self.retransmitted = 0;
        self.unacknowledged = unacknowledged;
        Ok(true)
    }
}
