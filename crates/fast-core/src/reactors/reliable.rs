//! Reactor wrapper around the [`Reliability`] ledger.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use fast_proto::{Frame, Packet, SessionId};

use crate::{
    channel::Channel,
    error::Result,
    pipeline::Reactor,
    reliability::{Reliability, ReliabilityAction},
};

/// Drives the per-channel reliability ledger.
///
/// Actions are executed while the ledger lock is held, so a retransmission
/// and a concurrent send on the same channel cannot interleave their ledger
/// updates.
#[derive(Debug, Default)]
pub struct ReliableDelivery {
    ledger: Mutex<Reliability>,
}

impl ReliableDelivery {
    /// Fresh ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current ledger
    pub fn ledger(&self) -> Reliability {
        self.lock().clone()
    }

    /// Versioned snapshot of the ledger
    pub fn save_state(&self) -> Bytes {
        self.lock().to_snapshot()
    }

    /// Restore a snapshot. Returns `false` for an unknown snapshot version.
    pub fn restore_state(&self, snapshot: &[u8]) -> Result<bool> {
        self.lock().restore_state(snapshot)
    }

    fn lock(&self) -> MutexGuard<'_, Reliability> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn execute(channel: &Channel, actions: Vec<ReliabilityAction>) -> Result<()> {
    for action in actions {
        match action {
            ReliabilityAction::Retransmit(packets) => channel.write_packets(&packets)?,
            ReliabilityAction::RequestAcknowledgment => channel.write_frame(&Frame::RequestAcknowledgment)?,
            ReliabilityAction::Acknowledge(count) => channel.write_frame(&Frame::Acknowledge(count))?,
        }
    }
    Ok(())
}

impl Reactor for ReliableDelivery {
    fn on_session_created(&self, _channel: &Channel, _session_id: &SessionId) -> Result<()> {
        self.lock().reset();
        Ok(())
    }

    fn on_fetch_requested(&self, channel: &Channel) -> Result<()> {
        let mut ledger = self.lock();
        let actions = ledger.flush();
        execute(channel, actions)
    }

    fn on_packet_received(&self, _channel: &Channel, _packet: &Packet) -> Result<()> {
        self.lock().on_packet_received();
        Ok(())
    }

    fn on_packet_sent(&self, _channel: &Channel, packet: &Packet) -> Result<()> {
        self.lock().on_packet_sent(packet.clone());
        Ok(())
    }

    fn on_acknowledgment_requested(&self, channel: &Channel) -> Result<()> {
        let ledger = self.lock();
        execute(channel, ledger.on_acknowledgment_requested())
    }

    fn on_acknowledgment_received(&self, channel: &Channel, count: u32) -> Result<()> {
        let mut ledger = self.lock();
        let actions = ledger.on_acknowledgment_received(count);
        execute(channel, actions)
    }
}
