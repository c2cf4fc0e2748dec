//! Event dispatch pipeline.
//!
//! Decoded protocol events flow through an ordered chain of reactors. Each
//! reactor handles the events it cares about and ignores the rest (every
//! handler has a no-op default).
//!
//! # Failure handling
//!
//! ```text
//!   event ──> reactor 1 ──> reactor 2 ──X reactor 3   reactor 4
//!                                       │
//!                                       └──> on_exception(err) to 1, 2, 3, 4
//! ```
//!
//! When a reactor returns an error the remaining reactors do not see that
//! event; instead every reactor receives `on_exception`. Exception handlers
//! cannot fail, so an exception never triggers another exception.

use std::sync::Arc;

use fast_proto::{Address, Credential, Packet, SessionId};
use tracing::trace;

use crate::{channel::Channel, error::Result, FastError};

/// A decoded protocol event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Connection header exchanged
    Connected,
    /// Peer sent ATTACH
    AttachRequested(Address),
    /// A session id was assigned (sent by the responder, received by the
    /// initiator)
    SessionCreated(SessionId),
    /// Peer sent AUTHENTICATE
    CredentialReceived(Credential),
    /// Peer sent IDENTIFY with an identity
    IdentityReceived(Address),
    /// Peer sent FETCH
    FetchRequested,
    /// Peer delivered a packet
    PacketReceived(Packet),
    /// We handed a packet to the channel
    PacketSent(Packet),
    /// Peer sent REQUEST_ACKNOWLEDGMENT
    AcknowledgmentRequested,
    /// Peer sent ACKNOWLEDGE
    AcknowledgmentReceived(u32),
    /// Connection closed; dispatched exactly once per channel
    Disconnected,
}

/// One stage of the pipeline.
///
/// Reactors are shared between the connection task and routing tasks, so
/// they must be `Send + Sync` and use interior mutability for state.
#[allow(unused_variables)]
pub trait Reactor: Send + Sync {
    /// Connection header exchanged
    fn on_connected(&self, channel: &Channel) -> Result<()> {
        Ok(())
    }

    /// Peer asked to attach to `address`
    fn on_attach_requested(&self, channel: &Channel, address: &Address) -> Result<()> {
        Ok(())
    }

    /// Session established
    fn on_session_created(&self, channel: &Channel, session_id: &SessionId) -> Result<()> {
        Ok(())
    }

    /// Peer submitted a credential
    fn on_credential_received(&self, channel: &Channel, credential: &Credential) -> Result<()> {
        Ok(())
    }

    /// Peer returned our identity
    fn on_identity_received(&self, channel: &Channel, identity: &Address) -> Result<()> {
        Ok(())
    }

    /// Peer asked for its mailbox
    fn on_fetch_requested(&self, channel: &Channel) -> Result<()> {
        Ok(())
    }

    /// Packet arrived from the peer
    fn on_packet_received(&self, channel: &Channel, packet: &Packet) -> Result<()> {
        Ok(())
    }

    /// Packet written to the peer
    fn on_packet_sent(&self, channel: &Channel, packet: &Packet) -> Result<()> {
        Ok(())
    }

    /// Peer asked how many packets we received
    fn on_acknowledgment_requested(&self, channel: &Channel) -> Result<()> {
        Ok(())
    }

    /// Peer reported how many packets it received
    fn on_acknowledgment_received(&self, channel: &Channel, count: u32) -> Result<()> {
        Ok(())
    }

    /// Connection closed
    fn on_disconnected(&self, channel: &Channel) -> Result<()> {
        Ok(())
    }

    /// An earlier reactor failed
    fn on_exception(&self, channel: &Channel, error: &FastError) {}
}

/// Ordered chain of reactors
#[derive(Clone, Default)]
pub struct Pipeline {
    reactors: Vec<Arc<dyn Reactor>>,
}

impl Pipeline {
    /// Empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reactor
    #[must_use]
    pub fn with(self, reactor: impl Reactor + 'static) -> Self {
        self.with_shared(Arc::new(reactor))
    }

    /// Append a reactor the caller keeps a handle to
    #[must_use]
    pub fn with_shared(mut self, reactor: Arc<dyn Reactor>) -> Self {
        self.reactors.push(reactor);
        self
    }

    /// Number of reactors
    pub fn len(&self) -> usize {
        self.reactors.len()
    }

    /// Whether the pipeline has no reactors
    pub fn is_empty(&self) -> bool {
        self.reactors.is_empty()
    }

    /// Deliver `event` to every reactor in order.
    ///
    /// Stops at the first failure and raises it on the channel, which
    /// broadcasts it through [`Pipeline::broadcast_exception`].
    pub fn dispatch(&self, channel: &Channel, event: &Event) {
        for (index, reactor) in self.reactors.iter().enumerate() {
            if let Err(error) = deliver(reactor.as_ref(), channel, event) {
                trace!(channel = %channel.id(), stage = index, ?error, "reactor failed");
                channel.raise(error);
                return;
            }
        }
    }

    /// Hand `error` to every reactor's exception handler.
    pub fn broadcast_exception(&self, channel: &Channel, error: &FastError) {
        for reactor in &self.reactors {
            reactor.on_exception(channel, error);
        }
    }
}

fn deliver(reactor: &dyn Reactor, channel: &Channel, event: &Event) -> Result<()> {
    match event {
        Event::Connected => reactor.on_connected(channel),
        Event::AttachRequested(address) => reactor.on_attach_requested(channel, address),
        Event::SessionCreated(session_id) => reactor.on_session_created(channel, session_id),
        Event::CredentialReceived(credential) => reactor.on_credential_received(channel, credential),
        Event::IdentityReceived(identity) => reactor.on_identity_received(channel, identity),
        Event::FetchRequested => reactor.on_fetch_requested(channel),
        Event::PacketReceived(packet) => reactor.on_packet_received(channel, packet),
        Event::PacketSent(packet) => reactor.on_packet_sent(channel, packet),
        Event::AcknowledgmentRequested => reactor.on_acknowledgment_requested(channel),
        Event::AcknowledgmentReceived(count) => reactor.on_acknowledgment_received(channel, *count),
        Event::Disconnected => reactor.on_disconnected(channel),
    }
}
