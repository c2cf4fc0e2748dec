//! Tracing of every pipeline event.
//!
//! [`EventLog`] only listens. None of its handlers fail, so it can sit at
//! the head of a pipeline without changing how events propagate.

use fast_proto::{Address, Credential, Packet, SessionId};
use tracing::{debug, info, trace, warn};

use crate::{channel::Channel, error::Result, pipeline::Reactor, FastError};

/// Logs every event passing through the pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct EventLog;

impl Reactor for EventLog {
    fn on_connected(&self, channel: &Channel) -> Result<()> {
        debug!(channel = %channel.id(), role = ?channel.role(), "connected");
        Ok(())
    }

    fn on_attach_requested(&self, channel: &Channel, address: &Address) -> Result<()> {
        debug!(channel = %channel.id(), %address, "attach requested");
        Ok(())
    }

    fn on_session_created(&self, channel: &Channel, session_id: &SessionId) -> Result<()> {
        debug!(channel = %channel.id(), %session_id, "session created");
        Ok(())
    }

    fn on_credential_received(&self, channel: &Channel, _credential: &Credential) -> Result<()> {
        debug!(channel = %channel.id(), "credential received");
        Ok(())
    }

    fn on_identity_received(&self, channel: &Channel, identity: &Address) -> Result<()> {
        info!(channel = %channel.id(), %identity, "identified");
        Ok(())
    }

    fn on_fetch_requested(&self, channel: &Channel) -> Result<()> {
        debug!(channel = %channel.id(), "fetch requested");
        Ok(())
    }

    fn on_packet_received(&self, channel: &Channel, packet: &Packet) -> Result<()> {
        trace!(channel = %channel.id(), from = %packet.from(), to = %packet.to(), len = packet.payload().len(), "packet received");
        Ok(())
    }

    fn on_packet_sent(&self, channel: &Channel, packet: &Packet) -> Result<()> {
        trace!(channel = %channel.id(), from = %packet.from(), to = %packet.to(), len = packet.payload().len(), "packet sent");
        Ok(())
    }

    fn on_acknowledgment_requested(&self, channel: &Channel) -> Result<()> {
        trace!(channel = %channel.id(), "acknowledgment requested");
        Ok(())
    }

    fn on_acknowledgment_received(&self, channel: &Channel, count: u32) -> Result<()> {
        trace!(channel = %channel.id(), count, "acknowledgment received");
        Ok(())
    }

    fn on_disconnected(&self, channel: &Channel) -> Result<()> {
        debug!(channel = %channel.id(), "disconnected");
        Ok(())
    }

    fn on_exception(&self, channel: &Channel, error: &FastError) {
        warn!(channel = %channel.id(), %error, "pipeline exception");
    }
}
