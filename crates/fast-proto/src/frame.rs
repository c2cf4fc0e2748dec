//! Command frames.
//!
//! A frame is a command byte followed by command-specific arguments:
//!
//! | Command | Arguments |
//! |---|---|
//! | ATTACH | small-buffer address |
//! | AUTHENTICATE | small-buffer credential |
//! | IDENTIFY | small-buffer identity (empty = rejected) |
//! | SESSION | small-buffer session id (empty = rejected) |
//! | FETCH, REQUEST_ACKNOWLEDGMENT, DETACH | none |
//! | SEND | count byte, then `count` packet frames |
//! | ACKNOWLEDGE | u32 received count |
//!
//! Decoding works on byte slices and reports [`ProtocolError::Incomplete`]
//! when the slice ends early, so a stream reader can buffer and retry
//! without re-implementing the layout. [`Frame::measure`] walks only the
//! length fields, so retrying on a partial frame copies nothing, and a frame
//! larger than [`MAX_FRAME_SIZE`] is refused before its body arrives.

use bytes::{BufMut, Bytes};

use crate::{
    Address, Command, Credential, MAX_PAYLOAD_SIZE, Packet, SessionId,
    buffer::{put_small_buffer, take, take_array, take_small_buffer, take_u8},
    errors::{ProtocolError, Result},
};

/// Largest number of packets one SEND frame can carry
pub const MAX_PACKETS_PER_SEND: usize = u8::MAX as usize;

/// Largest encoded frame, in bytes. One packet with a payload of
/// [`MAX_PAYLOAD_SIZE`] always fits.
pub const MAX_FRAME_SIZE: usize = 2 * MAX_PAYLOAD_SIZE;

/// Command byte and packet count
const SEND_OVERHEAD: usize = 2;

/// Outcome of a handshake step answered by the responder.
///
/// The wire signals rejection with an empty small buffer; this type keeps
/// that signal out of the value domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    /// The responder accepted the step and returned a value
    Accepted(T),
    /// The responder answered with an empty buffer
    Rejected,
}

impl<T> Reply<T> {
    /// The accepted value, if any
    pub fn accepted(self) -> Option<T> {
        match self {
            Self::Accepted(value) => Some(value),
            Self::Rejected => None,
        }
    }
}

/// A decoded command frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Request to reach an address
    Attach(Address),
    /// Credential submission
    Authenticate(Credential),
    /// Authentication reply carrying the identity
    Identify(Reply<Address>),
    /// Attach reply carrying the session id
    Session(Reply<SessionId>),
    /// Mailbox fetch request
    Fetch,
    /// Packet batch (at most [`MAX_PACKETS_PER_SEND`])
    Send(Vec<Packet>),
    /// Acknowledgment request
    RequestAcknowledgment,
    /// Received-packet count
    Acknowledge(u32),
    /// Terminal close
    Detach,
    /// Command byte outside the known table; carries no arguments
    Unknown(u8),
}

impl Frame {
    /// Command for this frame, `None` for [`Frame::Unknown`]
    pub fn command(&self) -> Option<Command> {
        match self {
            Self::Attach(_) => Some(Command::Attach),
            Self::Authenticate(_) => Some(Command::Authenticate),
            Self::Identify(_) => Some(Command::Identify),
            Self::Session(_) => Some(Command::Session),
            Self::Fetch => Some(Command::Fetch),
            Self::Send(_) => Some(Command::Send),
            Self::RequestAcknowledgment => Some(Command::RequestAcknowledgment),
            Self::Acknowledge(_) => Some(Command::Acknowledge),
            Self::Detach => Some(Command::Detach),
            Self::Unknown(_) => None,
        }
    }

    /// Append the encoded frame to `dst`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::TooManyPackets`] if a SEND frame holds more than
    /// [`MAX_PACKETS_PER_SEND`] packets, [`ProtocolError::FrameTooLarge`] if
    /// it would exceed [`MAX_FRAME_SIZE`]. Nothing is written in either case.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        match self {
            Self::Attach(address) => {
                dst.put_u8(Command::Attach.to_u8());
                put_small_buffer(dst, address.as_bytes());
            },
            Self::Authenticate(credential) => {
                dst.put_u8(Command::Authenticate.to_u8());
                put_small_buffer(dst, credential.as_bytes());
            },
            Self::Identify(reply) => {
                dst.put_u8(Command::Identify.to_u8());
                match reply {
                    Reply::Accepted(identity) => put_small_buffer(dst, identity.as_bytes()),
                    Reply::Rejected => dst.put_u8(0),
                }
            },
            Self::Session(reply) => {
                dst.put_u8(Command::Session.to_u8());
                match reply {
                    Reply::Accepted(session) => put_small_buffer(dst, session.as_bytes()),
                    Reply::Rejected => dst.put_u8(0),
                }
            },
            Self::Send(packets) => {
                if packets.len() > MAX_PACKETS_PER_SEND {
                    return Err(ProtocolError::TooManyPackets {
                        count: packets.len(),
                        max: MAX_PACKETS_PER_SEND,
                    });
                }
                let size = Self::send_len(packets);
                if size > MAX_FRAME_SIZE {
                    return Err(ProtocolError::FrameTooLarge { size, max: MAX_FRAME_SIZE });
                }
                dst.put_u8(Command::Send.to_u8());
                dst.put_u8(packets.len() as u8);
                for packet in packets {
                    packet.encode(dst);
                }
            },
            Self::Acknowledge(count) => {
                dst.put_u8(Command::Acknowledge.to_u8());
                dst.put_u32(*count);
            },
            Self::Fetch | Self::RequestAcknowledgment | Self::Detach => {
                if let Some(command) = self.command() {
                    dst.put_u8(command.to_u8());
                }
            },
            Self::Unknown(code) => dst.put_u8(*code),
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Decode one frame from the front of `src`.
    ///
    /// Returns the frame and the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Incomplete`] if `src` ends inside the frame
    /// - [`ProtocolError::InvalidLength`] for an empty address or credential
    /// - [`ProtocolError::PayloadTooLarge`] for an oversized packet payload
    /// - [`ProtocolError::FrameTooLarge`] for a frame over [`MAX_FRAME_SIZE`]
    pub fn decode(src: &[u8]) -> Result<(Self, usize)> {
        let len = Self::measure(src)?;
        let mut cursor = &src[..len];
        let code = take_u8(&mut cursor)?;

        let frame = match Command::from_u8(code) {
            Some(Command::Attach) => {
                Self::Attach(Address::new(Bytes::copy_from_slice(take_small_buffer(&mut cursor)?))?)
            },
            Some(Command::Authenticate) => {
                Self::Authenticate(Credential::new(take_small_buffer(&mut cursor)?.to_vec())?)
            },
            Some(Command::Identify) => {
                let raw = take_small_buffer(&mut cursor)?;
                if raw.is_empty() {
                    Self::Identify(Reply::Rejected)
                } else {
                    Self::Identify(Reply::Accepted(Address::new(Bytes::copy_from_slice(raw))?))
                }
            },
            Some(Command::Session) => {
                let raw = take_small_buffer(&mut cursor)?;
                if raw.is_empty() {
                    Self::Session(Reply::Rejected)
                } else {
                    Self::Session(Reply::Accepted(SessionId::new(Bytes::copy_from_slice(raw))?))
                }
            },
            Some(Command::Fetch) => Self::Fetch,
            Some(Command::Send) => {
                let count = usize::from(take_u8(&mut cursor)?);
                let mut packets = Vec::with_capacity(count);
                for _ in 0..count {
                    packets.push(Packet::decode(&mut cursor)?);
                }
                Self::Send(packets)
            },
            Some(Command::RequestAcknowledgment) => Self::RequestAcknowledgment,
            Some(Command::Acknowledge) => Self::Acknowledge(u32::from_be_bytes(take_array(&mut cursor)?)),
            Some(Command::Detach) => Self::Detach,
            None => Self::Unknown(code),
        };

        Ok((frame, len))
    }

    /// Length of the frame at the front of `src`, without decoding it.
    ///
    /// Only length fields are read; payloads are skipped, not copied.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Incomplete`] if `src` ends before the length is known
    /// - [`ProtocolError::PayloadTooLarge`] for an oversized packet payload
    /// - [`ProtocolError::FrameTooLarge`] as soon as the declared lengths pass
    ///   [`MAX_FRAME_SIZE`], even if the bytes have not arrived
    pub fn measure(src: &[u8]) -> Result<usize> {
        let mut cursor = src;
        let code = take_u8(&mut cursor)?;

        match Command::from_u8(code) {
            Some(Command::Attach | Command::Authenticate | Command::Identify | Command::Session) => {
                take_small_buffer(&mut cursor)?;
            },
            Some(Command::Acknowledge) => {
                take(&mut cursor, 4)?;
            },
            Some(Command::Send) => {
                let count = take_u8(&mut cursor)?;
                for _ in 0..count {
                    skip_packet(&mut cursor, src.len())?;
                }
            },
            Some(Command::Fetch | Command::RequestAcknowledgment | Command::Detach) | None => {},
        }

        Ok(src.len() - cursor.len())
    }

    /// Encoded size of a SEND frame carrying `packets`
    pub fn send_len(packets: &[Packet]) -> usize {
        SEND_OVERHEAD + packets.iter().map(Packet::encoded_len).sum::<usize>()
    }

    /// Split `packets` into runs that each fit one SEND frame, in order.
    pub fn send_batches(packets: &[Packet]) -> impl Iterator<Item = &[Packet]> {
        let mut rest = packets;
        std::iter::from_fn(move || {
            if rest.is_empty() {
                return None;
            }
            let mut size = SEND_OVERHEAD;
            let mut count = 0;
            for packet in rest.iter().take(MAX_PACKETS_PER_SEND) {
                let next = size + packet.encoded_len();
                if count > 0 && next > MAX_FRAME_SIZE {
                    break;
                }
                size = next;
                count += 1;
            }
            let (batch, tail) = rest.split_at(count);
            rest = tail;
            Some(batch)
        })
    }
}

/// Advance past one packet frame. `total` is the length of the slice the
/// frame started at, used to bound the frame size.
fn skip_packet(cursor: &mut &[u8], total: usize) -> Result<()> {
    take(cursor, 8)?;
    take_small_buffer(cursor)?;
    take_small_buffer(cursor)?;
    let len = u32::from_be_bytes(take_array(cursor)?) as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge { size: len, max: MAX_PAYLOAD_SIZE });
    }
    let size = total - cursor.len() + len;
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size, max: MAX_FRAME_SIZE });
    }
    take(cursor, len)?;
    Ok(())
}
