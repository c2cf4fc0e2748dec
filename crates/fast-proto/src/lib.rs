//! FAST wire codec
//!
//! Byte-exact encoding and decoding of the FAST protocol: the connection
//! header, command frames, small buffers and addressed packets. This crate
//! performs no I/O; stream handling lives in `fast-core`.
//!
//! # Components
//!
//! - [`ConnectionHeader`]: the 6-byte `FAST 1.0` preamble
//! - [`Command`]: command codes
//! - [`Frame`]: command frames and [`Reply`] handshake outcomes
//! - [`Packet`]: addressed messages carried by SEND
//! - [`Address`], [`Credential`], [`SessionId`]: validated small buffers
//! - [`ProtocolError`]: codec errors

pub mod buffer;
pub mod command;
pub mod errors;
pub mod frame;
pub mod header;
pub mod packet;

pub use buffer::{Address, Credential, MAX_SMALL_BUFFER, SessionId};
pub use command::Command;
pub use errors::{ProtocolError, Result};
pub use frame::{Frame, MAX_FRAME_SIZE, MAX_PACKETS_PER_SEND, Reply};
pub use header::ConnectionHeader;
pub use packet::{MAX_PAYLOAD_SIZE, Packet};
