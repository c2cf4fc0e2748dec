//! Deterministic simulation harness for FAST.
//!
//! Runs real servers and clients inside turmoil: virtual time, a seeded
//! RNG and a simulated network with configurable latency and loss. Given
//! the same seed a scenario produces the same session ids, the same
//! timestamps and the same interleaving.
//!
//! # Components
//!
//! - [`SimEnv`]: [`fast_core::Environment`] over turmoil time and ChaCha20
//! - [`SimTransport`]: [`fast_core::Transport`] over turmoil TCP
//! - [`run_server`] and [`connect_client`]: host wiring for scenarios

#![forbid(unsafe_code)]

mod sim_env;
mod sim_server;
mod sim_transport;

pub use sim_env::{SIM_EPOCH_MILLIS, SimEnv};
pub use sim_server::{REALM, SERVER_HOST, SimError, client_config, connect_client, run_server};
pub use sim_transport::SimTransport;
