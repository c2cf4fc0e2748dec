//! Routing and store-and-forward mailboxes.
//!
//! ```text
//!   SEND(packet) ──> Registry::route_packet
//!                        │
//!            ┌───────────┴────────────┐
//!            │ channels attached to   │ none attached
//!            │ packet.to              │
//!            ↓                        ↓
//!     write to each channel     mailbox(packet.to).push_back
//!     (failure: detach that          │
//!      channel only)                 │ FETCH from packet.to
//!                                    ↓
//!                           provide_fetched_packets (FIFO)
//! ```

mod address_map;
mod registry;

pub use address_map::{AddressMap, Locator};
pub use registry::{Mailbox, Registry, RouteOutcome};
