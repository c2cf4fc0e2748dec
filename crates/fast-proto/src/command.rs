//! Command codes.
//!
//! Every frame after the connection header starts with a single command byte.
//! Codes outside this table are not an error: the decoder yields
//! [`crate::Frame::Unknown`] and the dispatch layer skips them.

/// FAST command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Requester names the address it wishes to reach
    Attach = 0x01,
    /// Requester submits its credential
    Authenticate = 0x02,
    /// Responder returns the authenticated identity (empty = rejected)
    Identify = 0x03,
    /// Responder assigns a session id (empty = greeting rejected)
    Session = 0x04,
    /// Ask the peer for packets queued in the mailbox
    Fetch = 0x05,
    /// Batch of packets
    Send = 0x06,
    /// Ask the peer to report how many packets it has received
    RequestAcknowledgment = 0x07,
    /// Report the number of packets received
    Acknowledge = 0x08,
    /// Terminal: the sender is closing the connection
    Detach = 0xFF,
}

impl Command {
    /// Map a wire byte to a known command
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Attach),
            0x02 => Some(Self::Authenticate),
            0x03 => Some(Self::Identify),
            0x04 => Some(Self::Session),
            0x05 => Some(Self::Fetch),
            0x06 => Some(Self::Send),
            0x07 => Some(Self::RequestAcknowledgment),
            0x08 => Some(Self::Acknowledge),
            0xFF => Some(Self::Detach),
            _ => None,
        }
    }

    /// Wire byte for this command
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_maps_back_to_itself() {
        for code in 0..=u8::MAX {
            if let Some(command) = Command::from_u8(code) {
                assert_eq!(command.to_u8(), code);
            }
        }
    }

    #[test]
    fn unassigned_codes_are_unknown() {
        assert_eq!(Command::from_u8(0x00), None);
        assert_eq!(Command::from_u8(0x09), None);
        assert_eq!(Command::from_u8(0xFE), None);
    }
}
