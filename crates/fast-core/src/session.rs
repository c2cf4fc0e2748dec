//! Session state machine for the FAST handshake.
//!
//! Sequences the attach → session → authenticate → identify handshake on a
//! single connection. Like the rest of this crate it performs no I/O:
//! transition methods validate the current state, record the handshake data
//! and return [`SessionAction`]s for the caller (a reactor) to execute.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────────┐ header ┌───────────┐ ATTACH ┌──────────┐ SESSION ┌────────────────────┐
//! │ Unconnected │───────>│ Connected │───────>│ Attached │────────>│ SessionEstablished │
//! └─────────────┘        └───────────┘        └──────────┘         └────────────────────┘
//!                                                                            │ AUTHENTICATE
//!                                                                            ↓
//!                        ┌────────┐  DETACH / error / timeout  ┌────────────┐ IDENTIFY ┌───────────────┐
//!                        │ Closed │<───────────────────────────│ Identified │<─────────│ Authenticated │
//!                        └────────┘      (from any state)      └────────────┘          └───────────────┘
//! ```
//!
//! Transitions are one-directional; there is no re-attach within one
//! connection. Both sides run the same machine; the [`Role`] only decides
//! which edge-triggered actions a transition yields.
//!
//! # Timeouts
//!
//! The handshake must reach `Identified` within
//! [`SessionConfig::handshake_timeout`] of the connection being opened.

use std::time::{Duration, Instant};

use fast_proto::{Address, SessionId};

use crate::error::SessionError;

/// Which side of the connection this session represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened the connection, sends the header, attaches and authenticates
    Initiator,
    /// Accepted the connection, assigns sessions and authenticates peers
    Responder,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, header not yet exchanged
    Unconnected,
    /// Header written (initiator) or validated (responder)
    Connected,
    /// Attach address accepted
    Attached,
    /// Session id assigned
    SessionEstablished,
    /// Credential submitted (initiator) or accepted (responder)
    Authenticated,
    /// Identity bound to the connection
    Identified,
    /// Terminal
    Closed,
}

/// Side effects requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Send AUTHENTICATE with the configured credential
    SubmitCredential,
    /// Send FETCH to drain the mailbox for the new identity
    Fetch,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time allowed from connection start to `Identified`
    pub handshake_timeout: Duration,
    /// How often the driver checks the handshake deadline
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { handshake_timeout: Duration::from_secs(30), tick_interval: Duration::from_secs(1) }
    }
}

/// Handshake state machine for one connection.
///
/// Pure state: no I/O, no stored environment. Time is passed to the
/// methods that need it.
#[derive(Debug, Clone)]
pub struct Session {
    role: Role,
    state: SessionState,
    config: SessionConfig,
    started_at: Instant,
    /// Address named by ATTACH; the realm on the responder side
    attached_address: Option<Address>,
    session_id: Option<SessionId>,
    /// Authenticated identity; the peer's on the responder, our own on the
    /// initiator
    identity: Option<Address>,
}

impl Session {
    /// Create a session in `Unconnected` state
    pub fn new(role: Role, now: Instant, config: SessionConfig) -> Self {
        Self {
            role,
            state: SessionState::Unconnected,
            config,
            started_at: now,
            attached_address: None,
            session_id: None,
            identity: None,
        }
    }

    /// Side of the connection
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configuration this session was created with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Address named by ATTACH
    pub fn attached_address(&self) -> Option<&Address> {
        self.attached_address.as_ref()
    }

    /// Session id assigned by the responder
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Authenticated identity
    pub fn identity(&self) -> Option<&Address> {
        self.identity.as_ref()
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// `Unconnected → Connected`
    pub fn connect(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Unconnected, "connect")?;
        self.state = SessionState::Connected;
        Ok(())
    }

    /// `Connected → Attached`
    ///
    /// On the responder the address must already have passed the address
    /// verifier.
    pub fn attach(&mut self, address: Address) -> Result<(), SessionError> {
        self.require(SessionState::Connected, "attach")?;
        self.attached_address = Some(address);
        self.state = SessionState::Attached;
        Ok(())
    }

    /// `Attached → SessionEstablished`
    ///
    /// The initiator is asked to submit its credential.
    pub fn establish(&mut self, session_id: SessionId) -> Result<Vec<SessionAction>, SessionError> {
        self.require(SessionState::Attached, "establish")?;
        self.session_id = Some(session_id);
        self.state = SessionState::SessionEstablished;

        match self.role {
            Role::Initiator => Ok(vec![SessionAction::SubmitCredential]),
            Role::Responder => Ok(vec![]),
        }
    }

    /// `SessionEstablished → Authenticated`
    pub fn authenticate(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::SessionEstablished, "authenticate")?;
        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// `Authenticated → Identified`
    ///
    /// The initiator is asked to fetch its mailbox. This is edge-triggered:
    /// the transition can only happen once per connection.
    pub fn identify(&mut self, identity: Address) -> Result<Vec<SessionAction>, SessionError> {
        self.require(SessionState::Authenticated, "identify")?;
        self.identity = Some(identity);
        self.state = SessionState::Identified;

        match self.role {
            Role::Initiator => Ok(vec![SessionAction::Fetch]),
            Role::Responder => Ok(vec![]),
        }
    }

    /// Any state → `Closed`. Returns `false` if already closed.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closed;
        true
    }

    /// Elapsed time if the handshake has overrun its deadline.
    ///
    /// Always `None` once identified or closed.
    pub fn check_timeout(&self, now: Instant) -> Option<Duration> {
        if matches!(self.state, SessionState::Identified | SessionState::Closed) {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed > self.config.handshake_timeout).then_some(elapsed)
    }

    /// Fail unless the session is in `state`.
    pub fn require(&self, state: SessionState, operation: &'static str) -> Result<(), SessionError> {
        if self.state != state {
            return Err(SessionError::InvalidState { state: self.state, operation });
        }
        Ok(())
    }
}
