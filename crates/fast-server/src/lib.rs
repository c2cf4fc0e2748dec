//! FAST protocol runtime.
//!
//! Production I/O around the sans-IO core in `fast-core`: the per-connection
//! driver, the server accept loop, the client connector and the system
//! environment.
//!
//! # Components
//!
//! - [`connection`]: Read loop and writer task for one byte stream
//! - [`server`]: [`Server`] accept loop and pipeline wiring, [`TcpTransport`]
//! - [`client`]: [`Client`] connector (initiator side of the handshake)
//! - [`config`]: Server and client configuration
//! - [`mod@env`]: [`SystemEnv`] (tokio clock, OS entropy)

pub mod client;
pub mod config;
pub mod connection;
pub mod env;
pub mod error;
pub mod server;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, DEFAULT_PORT, ServerConfig};
pub use env::SystemEnv;
pub use error::ServerError;
pub use server::{Server, TcpTransport};
