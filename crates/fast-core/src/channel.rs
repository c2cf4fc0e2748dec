//! Channel: the write-capable half of a connection.
//!
//! A `Channel` is a cheap, cloneable handle shared by the connection task,
//! the reactors and routing. Writes never touch the socket directly: frames
//! are encoded up front and queued for the connection's writer task, so
//! frames written concurrently from different tasks never interleave.
//!
//! ```text
//!   reader task ──┐                           ┌──────────────┐
//!   routing ──────┼──> Channel ──> Outbound ──> writer task  ├──> socket
//!   reactors ─────┘       │        queue      └──────────────┘
//!                         └── Session (handshake state, addresses)
//! ```

use std::{
    fmt,
    ops::ControlFlow,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use fast_proto::{Address, ConnectionHeader, Frame, Packet, Reply, SessionId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use crate::{
    error::{FastError, Result},
    pipeline::{Event, Pipeline},
    session::{Role, Session, SessionState},
};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique channel identifier, used in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Work item for the connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Fully encoded bytes to write and flush
    Frame(Bytes),
    /// Shut the write half down and stop
    Close,
}

/// Cloneable handle to one connection
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

struct Inner {
    id: ChannelId,
    outbound: mpsc::UnboundedSender<Outbound>,
    session: Mutex<Session>,
    state: watch::Sender<SessionState>,
    pipeline: Pipeline,
    error: Mutex<Option<FastError>>,
    disconnected: AtomicBool,
}

impl Channel {
    /// Create a channel and the receiving end of its write queue.
    ///
    /// The caller hands the receiver to a writer task.
    pub fn new(session: Session, pipeline: Pipeline) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(session.state());
        let inner = Inner {
            id: ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed)),
            outbound,
            session: Mutex::new(session),
            state,
            pipeline,
            error: Mutex::new(None),
            disconnected: AtomicBool::new(false),
        };
        (Self { inner: Arc::new(inner) }, receiver)
    }

    /// Channel identifier
    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    /// Our side of the connection
    pub fn role(&self) -> Role {
        self.lock_session().role()
    }

    /// Current handshake state
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Whether the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Watch handshake state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Address named by ATTACH
    pub fn attached_address(&self) -> Option<Address> {
        self.lock_session().attached_address().cloned()
    }

    /// Authenticated identity
    pub fn identity(&self) -> Option<Address> {
        self.lock_session().identity().cloned()
    }

    /// Session id
    pub fn session_id(&self) -> Option<SessionId> {
        self.lock_session().session_id().cloned()
    }

    /// Run `f` against the session and publish the resulting state.
    ///
    /// `f` must not dispatch events or write to the channel.
    pub fn with_session<T>(&self, f: impl FnOnce(&mut Session) -> T) -> T {
        let mut session = self.lock_session();
        let output = f(&mut session);
        self.publish(&session);
        output
    }

    /// Queue the connection header.
    pub fn write_header(&self) -> Result<()> {
        self.enqueue(Bytes::copy_from_slice(&ConnectionHeader::CURRENT.to_bytes()))
    }

    /// Queue one frame.
    pub fn write_frame(&self, frame: &Frame) -> Result<()> {
        self.enqueue(frame.to_bytes()?)
    }

    /// Queue packets as SEND frames without notifying the pipeline.
    ///
    /// Used for retransmission, where the ledger already holds the packets.
    pub fn write_packets(&self, packets: &[Packet]) -> Result<()> {
        let mut buf = Vec::new();
        for batch in Frame::send_batches(packets) {
            Frame::Send(batch.to_vec()).encode(&mut buf)?;
        }
        if buf.is_empty() {
            return Ok(());
        }
        self.enqueue(Bytes::from(buf))
    }

    /// Queue packets as SEND frames and dispatch `PacketSent` for each.
    pub fn send_packets(&self, packets: &[Packet]) -> Result<()> {
        self.write_packets(packets)?;
        for packet in packets {
            self.dispatch(&Event::PacketSent(packet.clone()));
        }
        Ok(())
    }

    /// Run `event` through this channel's pipeline.
    pub fn dispatch(&self, event: &Event) {
        self.inner.pipeline.dispatch(self, event);
    }

    /// Report a failure: remember it and broadcast it to every reactor.
    pub fn raise(&self, error: FastError) {
        warn!(channel = %self.id(), %error, "channel error");
        {
            let mut slot = self.inner.error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(error.clone());
            }
        }
        self.inner.pipeline.broadcast_exception(self, &error);
    }

    /// First error raised on this channel
    pub fn last_error(&self) -> Option<FastError> {
        self.inner.error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Send DETACH and close. No-op if already closed.
    pub fn detach(&self) {
        if self.shut(true) {
            debug!(channel = %self.id(), "detached");
        }
    }

    /// Close without sending DETACH. No-op if already closed.
    pub fn close(&self) {
        self.shut(false);
    }

    /// Close the session and queue the final items under the session lock,
    /// so no frame can be queued behind `Outbound::Close`.
    fn shut(&self, detach: bool) -> bool {
        let mut session = self.lock_session();
        if !session.close() {
            return false;
        }
        self.publish(&session);
        if detach {
            if let Ok(bytes) = Frame::Detach.to_bytes() {
                let _ = self.inner.outbound.send(Outbound::Frame(bytes));
            }
        }
        let _ = self.inner.outbound.send(Outbound::Close);
        true
    }

    /// Close the channel and dispatch `Disconnected`, exactly once.
    pub fn finish(&self) {
        if self.inner.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close();
        self.dispatch(&Event::Disconnected);
    }

    /// Translate an inbound frame into pipeline events.
    ///
    /// Returns `Break` when the connection should stop reading: the peer
    /// sent DETACH or a reactor closed the channel.
    pub fn receive(&self, frame: Frame) -> ControlFlow<()> {
        let role = self.role();
        match frame {
            Frame::Attach(address) if role == Role::Responder => {
                self.dispatch(&Event::AttachRequested(address));
            },
            Frame::Authenticate(credential) if role == Role::Responder => {
                self.dispatch(&Event::CredentialReceived(credential));
            },
            Frame::Session(reply) if role == Role::Initiator => match reply {
                Reply::Accepted(session_id) => self.dispatch(&Event::SessionCreated(session_id)),
                Reply::Rejected => self.raise(FastError::GreetingRejected),
            },
            Frame::Identify(reply) if role == Role::Initiator => match reply {
                Reply::Accepted(identity) => self.dispatch(&Event::IdentityReceived(identity)),
                Reply::Rejected => self.raise(FastError::AuthenticationRejected),
            },
            Frame::Fetch => self.dispatch(&Event::FetchRequested),
            Frame::Send(packets) => {
                for packet in packets {
                    if self.is_closed() {
                        break;
                    }
                    self.dispatch(&Event::PacketReceived(packet));
                }
            },
            Frame::RequestAcknowledgment => self.dispatch(&Event::AcknowledgmentRequested),
            Frame::Acknowledge(count) => self.dispatch(&Event::AcknowledgmentReceived(count)),
            Frame::Detach => {
                debug!(channel = %self.id(), "peer detached");
                return ControlFlow::Break(());
            },
            Frame::Unknown(code) => {
                trace!(channel = %self.id(), code, "ignoring unknown command");
            },
            other => {
                if let Some(command) = other.command() {
                    self.raise(FastError::UnexpectedFrame { command, role });
                }
            },
        }

        if self.is_closed() { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
    }

    fn enqueue(&self, bytes: Bytes) -> Result<()> {
        // held until the frame is queued; see `shut`
        let session = self.lock_session();
        if session.state() == SessionState::Closed {
            return Err(FastError::Write(format!("channel {} is closed", self.id())));
        }
        self.inner
            .outbound
            .send(Outbound::Frame(bytes))
            .map_err(|_| FastError::Write(format!("channel {} writer is gone", self.id())))
    }

    fn publish(&self, session: &Session) {
        self.inner.state.send_if_modified(|state| {
            let changed = *state != session.state();
            *state = session.state();
            changed
        });
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.inner.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Channel {}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").field("id", &self.id()).field("state", &self.state()).finish()
    }
}
