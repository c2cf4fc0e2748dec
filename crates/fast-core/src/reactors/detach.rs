//! Closing a connection after a pipeline failure.

use fast_proto::{Frame, Reply};
use tracing::debug;

use crate::{channel::Channel, pipeline::Reactor, FastError};

/// Closes the connection on any pipeline failure.
///
/// Handshake rejections are announced first with the protocol's rejection
/// signal: an empty SESSION for an unknown address, an empty IDENTIFY for
/// an invalid credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachOnException;

impl Reactor for DetachOnException {
    fn on_exception(&self, channel: &Channel, error: &FastError) {
        let rejection = match error {
            FastError::UnknownAddress(_) => Some(Frame::Session(Reply::Rejected)),
            FastError::InvalidCredential => Some(Frame::Identify(Reply::Rejected)),
            _ => None,
        };
        if let Some(frame) = rejection {
            if let Err(err) = channel.write_frame(&frame) {
                debug!(channel = %channel.id(), %err, "could not send rejection");
            }
        }

        channel.detach();
    }
}
