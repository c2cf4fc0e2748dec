//! Server-side packet routing.
//!
//! [`PacketDelivery`] hands each received packet to the [`Registry`];
//! [`FlushOnFetch`] drains the attached address's mailbox when the client
//! sends FETCH.

use std::sync::Arc;

use fast_proto::{Credential, Frame, Packet};
use tracing::{debug, trace};

use crate::{
    channel::Channel,
    error::{FastError, Result},
    pipeline::Reactor,
    routing::Registry,
};

/// Routes every received packet through the registry
#[derive(Clone)]
pub struct PacketDelivery {
    registry: Arc<Registry>,
}

impl PacketDelivery {
    /// Delivery through `registry`
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl Reactor for PacketDelivery {
    fn on_packet_received(&self, channel: &Channel, packet: &Packet) -> Result<()> {
        let outcome = self.registry.route_packet(packet.clone());
        trace!(channel = %channel.id(), to = %packet.to(), ?outcome, "routed packet");
        Ok(())
    }
}

/// Answers FETCH with everything queued for the channel's identity
#[derive(Clone)]
pub struct FlushOnFetch {
    registry: Arc<Registry>,
}

impl FlushOnFetch {
    /// Mailbox flushing backed by `registry`
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl Reactor for FlushOnFetch {
    fn on_fetch_requested(&self, channel: &Channel) -> Result<()> {
        let identity = channel.identity().ok_or(FastError::NotIdentified)?;
        let packets = self.registry.provide_fetched_packets(&identity);
        if packets.is_empty() {
            return Ok(());
        }

        debug!(channel = %channel.id(), %identity, count = packets.len(), "flushing mailbox");
        if let Err(err) = channel.send_packets(&packets) {
            self.registry.requeue(&identity, packets);
            return Err(err);
        }
        channel.write_frame(&Frame::RequestAcknowledgment)
    }
}

/// Keeps the registry's address → channel map in step with the channel
/// lifecycle: attach once authenticated, release everything on disconnect
#[derive(Clone)]
pub struct RouteAttachment {
    registry: Arc<Registry>,
}

impl RouteAttachment {
    /// Attachment tracking in `registry`
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl Reactor for RouteAttachment {
    fn on_credential_received(&self, channel: &Channel, _credential: &Credential) -> Result<()> {
        if let Some(identity) = channel.identity() {
            self.registry.attach(&identity, channel.clone());
        }
        Ok(())
    }

    fn on_disconnected(&self, channel: &Channel) -> Result<()> {
        let released = self.registry.release(channel);
        trace!(channel = %channel.id(), released, "released routes");
        Ok(())
    }
}
