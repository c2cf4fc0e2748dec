//! Error types for the FAST runtime core.
//!
//! - [`SessionError`]: invalid handshake transitions
//! - [`ReadError`]: failures turning inbound bytes into frames
//! - [`FastError`]: everything a reactor or the connection driver can raise
//!
//! I/O errors are flattened to strings so that errors stay `Clone` and
//! comparable in tests, and so the same error can be broadcast to every
//! reactor in a pipeline.

use std::{io, time::Duration};

use fast_proto::{Address, Command, ProtocolError};
use thiserror::Error;

use crate::session::{Role, SessionState};

/// Invalid session state transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation is not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State when the operation was attempted
        state: SessionState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

/// Failure reading a frame from a byte stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Malformed frame or connection header
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Stream ended in the middle of a frame
    #[error("stream closed mid-frame with {buffered} bytes buffered")]
    Truncated {
        /// Bytes of the partial frame already received
        buffered: usize,
    },

    /// Stream ended before the peer answered
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Underlying transport error
    #[error("transport error: {0}")]
    Io(String),
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return Self::UnexpectedEof;
        }
        Self::Io(err.to_string())
    }
}

/// Errors raised while driving a FAST connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FastError {
    /// Inbound bytes could not be decoded
    #[error("read error: {0}")]
    Read(#[from] ReadError),

    /// Outbound frame could not be written
    #[error("write error: {0}")]
    Write(String),

    /// Address verifier rejected an ATTACH
    #[error("unknown address: {0}")]
    UnknownAddress(Address),

    /// Authenticator rejected a credential
    #[error("invalid credential")]
    InvalidCredential,

    /// Peer answered ATTACH with an empty SESSION
    #[error("greeting rejected by peer")]
    GreetingRejected,

    /// Peer answered AUTHENTICATE with an empty IDENTIFY
    #[error("authentication rejected by peer")]
    AuthenticationRejected,

    /// Handshake step out of order
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Frame not valid for this side of the connection
    #[error("unexpected {command:?} frame on {role:?} side")]
    UnexpectedFrame {
        /// Command that arrived
        command: Command,
        /// Our side of the connection
        role: Role,
    },

    /// Operation needs an identified peer
    #[error("channel is not identified")]
    NotIdentified,

    /// Handshake did not complete in time
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Reliability snapshot could not be restored
    #[error("invalid reliability snapshot: {0}")]
    Snapshot(String),
}

impl FastError {
    /// Errors after which the byte stream cannot be trusted.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Write(_))
    }
}

impl From<ProtocolError> for FastError {
    fn from(err: ProtocolError) -> Self {
        Self::Read(ReadError::Protocol(err))
    }
}

/// Convenient Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, FastError>;
