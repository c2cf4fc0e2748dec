//! Lifecycle-scoped routing state.
//!
//! The [`Registry`] owns two maps, created with the server and shared by
//! every connection task through an `Arc`:
//!
//! - address → attached channels (one address may have many devices)
//! - address → mailbox (packets that arrived while nobody was attached)
//!
//! Each map sits behind its own mutex. Critical sections only touch the
//! map; channel writes happen after the lock is released.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use fast_proto::{Address, Packet};
use tracing::{debug, warn};

use super::AddressMap;
use crate::channel::Channel;

/// What [`Registry::route_packet`] did with a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// `from == to`; dropped as already delivered
    Echo,
    /// No channel accepted the packet; appended to the recipient's mailbox
    Queued,
    /// Written to `delivered` channels; `failed` channels were detached
    Delivered {
        /// Channels that accepted the packet
        delivered: usize,
        /// Channels whose write failed
        failed: usize,
    },
}

/// Address → channels and address → mailbox maps
#[derive(Default)]
pub struct Registry {
    channels: Mutex<AddressMap<Vec<Channel>>>,
    mailboxes: Mutex<AddressMap<VecDeque<Packet>>>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `channel` to `address`. Attaching twice is a no-op.
    pub fn attach(&self, address: &Address, channel: Channel) {
        let mut channels = lock(&self.channels);
        let attached = channels.get_or_insert_with(address, Vec::new);
        if !attached.contains(&channel) {
            debug!(channel = %channel.id(), %address, "attached");
            attached.push(channel);
        }
    }

    /// Detach `channel` from `address`. Unknown pairs are ignored.
    pub fn detach(&self, address: &Address, channel: &Channel) {
        let mut channels = lock(&self.channels);
        let now_empty = match channels.get_mut(address) {
            Some(attached) => {
                attached.retain(|candidate| candidate != channel);
                attached.is_empty()
            },
            None => return,
        };
        if now_empty {
            channels.remove(address);
        }
    }

    /// Detach `channel` from every address in one step.
    ///
    /// Returns the number of addresses it was attached to.
    pub fn release(&self, channel: &Channel) -> usize {
        let mut released = 0;
        lock(&self.channels).retain(|_, attached| {
            let before = attached.len();
            attached.retain(|candidate| candidate != channel);
            released += before - attached.len();
            !attached.is_empty()
        });
        released
    }

    /// Channels currently attached to `address`
    pub fn channels(&self, address: &Address) -> Vec<Channel> {
        lock(&self.channels).get(address).cloned().unwrap_or_default()
    }

    /// Deliver `packet` to every channel attached to its recipient, or
    /// queue it in the recipient's mailbox.
    ///
    /// A failed write detaches only the failing channel and raises the
    /// error on it. If no channel accepts the packet it is queued.
    pub fn route_packet(&self, packet: Packet) -> RouteOutcome {
        if packet.is_echo() {
            debug!(address = %packet.to(), "dropping echo packet");
            return RouteOutcome::Echo;
        }

        let recipients = self.channels(packet.to());
        let mut delivered = 0;
        let mut failed = 0;
        for channel in recipients {
            match channel.send_packets(std::slice::from_ref(&packet)) {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(channel = %channel.id(), address = %packet.to(), %error, "delivery failed");
                    self.detach(packet.to(), &channel);
                    channel.raise(error);
                    failed += 1;
                },
            }
        }

        if delivered == 0 {
            self.enqueue(packet);
            return RouteOutcome::Queued;
        }
        RouteOutcome::Delivered { delivered, failed }
    }

    /// Handle to the mailbox of `address`, created lazily on first packet
    pub fn create_mailbox(self: &Arc<Self>, address: Address) -> Mailbox {
        Mailbox { registry: Arc::clone(self), address }
    }

    /// Drain every queued packet for `address`, oldest first.
    pub fn provide_fetched_packets(&self, address: &Address) -> Vec<Packet> {
        lock(&self.mailboxes).remove(address).map(Vec::from).unwrap_or_default()
    }

    /// Put undelivered packets back at the front of the mailbox, keeping
    /// their order ahead of anything queued since.
    pub fn requeue(&self, address: &Address, packets: Vec<Packet>) {
        if packets.is_empty() {
            return;
        }
        let mut mailboxes = lock(&self.mailboxes);
        let queue = mailboxes.get_or_insert_with(address, VecDeque::new);
        for packet in packets.into_iter().rev() {
            queue.push_front(packet);
        }
    }

    /// Number of packets waiting for `address`
    pub fn queued(&self, address: &Address) -> usize {
        lock(&self.mailboxes).get(address).map_or(0, VecDeque::len)
    }

    fn enqueue(&self, packet: Packet) {
        debug!(address = %packet.to(), "queueing packet in mailbox");
        let address = packet.to().clone();
        lock(&self.mailboxes).get_or_insert_with(&address, VecDeque::new).push_back(packet);
    }

    fn dequeue(&self, address: &Address) -> Option<Packet> {
        let mut mailboxes = lock(&self.mailboxes);
        let queue = mailboxes.get_mut(address)?;
        let packet = queue.pop_front();
        if queue.is_empty() {
            mailboxes.remove(address);
        }
        packet
    }
}

/// Per-address mailbox handle
#[derive(Clone)]
pub struct Mailbox {
    registry: Arc<Registry>,
    address: Address,
}

impl Mailbox {
    /// Owner of the mailbox
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Dequeue the oldest packet.
    ///
    /// Each packet is handed out at most once, even if the caller is
    /// interrupted before using it.
    pub fn provide_packet(&self) -> Option<Packet> {
        self.registry.dequeue(&self.address)
    }

    /// Number of packets waiting
    pub fn len(&self) -> usize {
        self.registry.queued(&self.address)
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for Mailbox {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        self.provide_packet()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
