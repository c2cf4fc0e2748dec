//! Pipeline reactors.
//!
//! Each reactor owns one concern. The server and client wire them in a
//! fixed order:
//!
//! ```text
//! server: EventLog → DetachOnException → ReliableDelivery → PacketObserver
//!         → AddressFilter → SessionCreator → CredentialAuthenticator
//!         → PacketDelivery → FlushOnFetch → RouteAttachment
//!
//! client: EventLog → DetachOnException → ReliableDelivery → PacketObserver
//!         → ConnectionObserver → ClientHandshake
//! ```
//!
//! Reliability runs before the handshake reactors so that the ledger is
//! reset by `SessionCreated` before any credential traffic is counted.

mod delivery;
mod detach;
mod handshake;
mod log;
mod observer;
mod reliable;

pub use delivery::{FlushOnFetch, PacketDelivery, RouteAttachment};
pub use detach::DetachOnException;
pub use handshake::{AddressFilter, ClientHandshake, CredentialAuthenticator, SessionCreator};
pub use log::EventLog;
pub use observer::{ConnectionObserver, PacketObserver};
pub use reliable::ReliableDelivery;
