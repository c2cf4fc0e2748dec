//! Listener adapters for application callbacks.

use std::sync::Arc;

use fast_proto::{Address, Packet};

use crate::{
    capabilities::{ConnectionListener, PacketListener},
    channel::Channel,
    error::Result,
    pipeline::Reactor,
};

/// Forwards packet traffic to a [`PacketListener`]
#[derive(Clone)]
pub struct PacketObserver {
    listener: Arc<dyn PacketListener>,
}

impl PacketObserver {
    /// Observer notifying `listener`
    pub fn new(listener: Arc<dyn PacketListener>) -> Self {
        Self { listener }
    }
}

impl Reactor for PacketObserver {
    fn on_packet_received(&self, _channel: &Channel, packet: &Packet) -> Result<()> {
        self.listener.on_packet_received(packet);
        Ok(())
    }

    fn on_packet_sent(&self, _channel: &Channel, packet: &Packet) -> Result<()> {
        self.listener.on_packet_sent(packet);
        Ok(())
    }
}

/// Forwards handshake completion and disconnects to a
/// [`ConnectionListener`]
#[derive(Clone)]
pub struct ConnectionObserver {
    listener: Arc<dyn ConnectionListener>,
}

impl ConnectionObserver {
    /// Observer notifying `listener`
    pub fn new(listener: Arc<dyn ConnectionListener>) -> Self {
        Self { listener }
    }
}

impl Reactor for ConnectionObserver {
    fn on_identity_received(&self, _channel: &Channel, identity: &Address) -> Result<()> {
        self.listener.on_connected(identity);
        Ok(())
    }

    fn on_disconnected(&self, _channel: &Channel) -> Result<()> {
        self.listener.on_disconnected();
        Ok(())
    }
}
