//! FAST protocol core logic
//!
//! Everything between the wire codec and a socket: the handshake state
//! machine, the acknowledgment ledger, the event pipeline and the routing
//! registry.
//!
//! # Architecture
//!
//! The state machines here ([`Session`], [`Reliability`]) perform no I/O.
//! Transitions return declarative actions; reactors in the pipeline turn
//! those actions into frames queued on a [`Channel`]. A connection driver
//! (the server crate, or a simulation harness) owns the socket, feeds
//! decoded frames into [`Channel::receive`] and drains the channel's write
//! queue.
//!
//! Time and randomness come from an [`Environment`], so the same code runs
//! against the system clock in production and a seeded clock in
//! simulation.
//!
//! # Components
//!
//! - [`session`]: Handshake state machine (attach, session, authenticate,
//!   identify)
//! - [`reliability`]: Sent/received counters and retransmission buffer
//! - [`pipeline`]: Ordered reactor chain and exception broadcast
//! - [`reactors`]: The stock reactors a client or server wires together
//! - [`routing`]: Address → channel attachments and per-address mailboxes
//! - [`channel`]: Cloneable handle to one connection's write queue
//! - [`stream`]: Incremental frame reader and the writer task
//! - [`capabilities`]: Pluggable address, credential and session policies
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`transport`]: Transport abstraction (accepting streams)
//! - [`error`]: Error types

pub mod capabilities;
pub mod channel;
pub mod env;
pub mod error;
pub mod pipeline;
pub mod reactors;
pub mod reliability;
pub mod routing;
pub mod session;
pub mod stream;
pub mod transport;

pub use channel::{Channel, ChannelId, Outbound};
pub use env::Environment;
pub use error::{FastError, ReadError, SessionError};
pub use pipeline::{Event, Pipeline, Reactor};
pub use reliability::{Reliability, ReliabilityAction};
pub use routing::{Mailbox, Registry, RouteOutcome};
pub use session::{Role, Session, SessionAction, SessionConfig, SessionState};
pub use transport::Transport;
