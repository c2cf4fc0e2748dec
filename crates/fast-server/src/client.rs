//! FAST client connector.
//!
//! [`Client::builder`] wires the initiator pipeline, spawns the connection
//! driver and waits for the handshake to finish. The returned [`Client`]
//! sends packets over the established session.
//!
//! # Reconnecting
//!
//! A reliability snapshot taken with [`Client::save_state`] survives the
//! connection. After reconnecting, [`Client::restore_state`] resends the
//! packets the old session never saw acknowledged. The new session's
//! counters start from zero on both ends, so the packets are sent as fresh
//! traffic rather than by restoring the old counters.

use std::sync::Arc;

use bytes::Bytes;
use fast_core::{
    Channel, Environment, FastError, Pipeline, ReadError, Reliability, Role, Session, SessionState,
    capabilities::{ConnectionListener, PacketListener},
    reactors::{ClientHandshake, ConnectionObserver, DetachOnException, EventLog, PacketObserver, ReliableDelivery},
};
use fast_proto::{Address, Frame, Packet};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{config::ClientConfig, connection};

/// Builder for a [`Client`] connection
pub struct ClientBuilder<E> {
    config: ClientConfig,
    env: E,
    packets: Option<Arc<dyn PacketListener>>,
    connections: Option<Arc<dyn ConnectionListener>>,
}

impl<E: Environment> ClientBuilder<E> {
    /// Observe packets sent and received on the connection
    #[must_use]
    pub fn packet_listener(mut self, listener: Arc<dyn PacketListener>) -> Self {
        self.packets = Some(listener);
        self
    }

    /// Observe handshake completion and disconnects
    #[must_use]
    pub fn connection_listener(mut self, listener: Arc<dyn ConnectionListener>) -> Self {
        self.connections = Some(listener);
        self
    }

    /// Open the connection over `stream` and run the handshake.
    ///
    /// # Errors
    ///
    /// The first error raised on the channel if the connection closes before
    /// the identity is returned: a rejected greeting or credential, a
    /// handshake timeout or a transport failure.
    pub async fn connect<S>(self, stream: S) -> Result<Client<E>, FastError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let reliability = Arc::new(ReliableDelivery::new());
        let mut pipeline =
            Pipeline::new().with(EventLog).with(DetachOnException).with_shared(reliability.clone());
        if let Some(listener) = self.packets {
            pipeline = pipeline.with(PacketObserver::new(listener));
        }
        if let Some(listener) = self.connections {
            pipeline = pipeline.with(ConnectionObserver::new(listener));
        }
        let pipeline = pipeline.with(ClientHandshake::new(self.config.address.clone(), self.config.credential));

        let session = Session::new(Role::Initiator, self.env.now(), self.config.session);
        let (channel, outbound) = Channel::new(session, pipeline);
        let mut state = channel.subscribe();

        let driver = tokio::spawn(connection::drive(
            stream,
            channel.clone(),
            outbound,
            self.env.clone(),
            std::future::pending(),
        ));

        let reached = state
            .wait_for(|state| matches!(state, SessionState::Identified | SessionState::Closed))
            .await
            .map(|state| *state)
            .unwrap_or(SessionState::Closed);

        if reached == SessionState::Closed {
            let error = channel.last_error().unwrap_or(FastError::Read(ReadError::UnexpectedEof));
            let _ = driver.await;
            return Err(error);
        }

        info!(channel = %channel.id(), identity = ?channel.identity(), "client identified");
        Ok(Client { channel, reliability, env: self.env, driver })
    }
}

/// An identified FAST connection
pub struct Client<E> {
    channel: Channel,
    reliability: Arc<ReliableDelivery>,
    env: E,
    driver: JoinHandle<()>,
}

impl<E: Environment> Client<E> {
    /// Start configuring a connection
    pub fn builder(config: ClientConfig, env: E) -> ClientBuilder<E> {
        ClientBuilder { config, env, packets: None, connections: None }
    }

    /// Identity assigned by the server
    pub fn identity(&self) -> Option<Address> {
        self.channel.identity()
    }

    /// Underlying channel
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Whether the connection has closed
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Send one packet from our identity to `to`, stamped with the current
    /// wall-clock time.
    pub fn send(&self, to: Address, payload: impl Into<Bytes>) -> Result<(), FastError> {
        let from = self.identity().ok_or(FastError::NotIdentified)?;
        let packet = Packet::new(self.env.unix_millis(), from, to, payload)?;
        self.channel.send_packets(std::slice::from_ref(&packet))
    }

    /// Send prepared packets.
    pub fn send_packets(&self, packets: &[Packet]) -> Result<(), FastError> {
        self.channel.send_packets(packets)
    }

    /// Ask the server to acknowledge what it has received so far.
    pub fn request_acknowledgment(&self) -> Result<(), FastError> {
        self.channel.write_frame(&Frame::RequestAcknowledgment)
    }

    /// Copy of the reliability ledger
    pub fn ledger(&self) -> Reliability {
        self.reliability.ledger()
    }

    /// Versioned snapshot of the reliability ledger
    pub fn save_state(&self) -> Bytes {
        self.reliability.save_state()
    }

    /// Resend the unacknowledged packets recorded in `snapshot` and request
    /// an acknowledgment.
    ///
    /// Returns `false` if the snapshot version is unknown; nothing is sent.
    pub fn restore_state(&self, snapshot: &[u8]) -> Result<bool, FastError> {
        let mut saved = Reliability::new();
        if !saved.restore_state(snapshot)? {
            return Ok(false);
        }

        let pending = saved.unacknowledged();
        if !pending.is_empty() {
            debug!(channel = %self.channel.id(), count = pending.len(), "resending unacknowledged packets");
            self.channel.send_packets(pending)?;
            self.request_acknowledgment()?;
        }
        Ok(true)
    }

    /// Wait until the connection closes.
    pub async fn closed(&self) {
        let mut state = self.channel.subscribe();
        let _ = state.wait_for(|state| *state == SessionState::Closed).await;
    }

    /// Send DETACH and wait for the connection to wind down.
    pub async fn detach(self) {
        self.channel.detach();
        let _ = self.driver.await;
    }
}
