//! Runtime configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use fast_core::SessionConfig;
use fast_proto::{Address, Credential};

/// Default FAST port
pub const DEFAULT_PORT: u16 = 4857;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// Realms clients may attach to; empty accepts any address
    pub realms: Vec<Address>,
    /// Per-connection handshake settings
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            realms: Vec::new(),
            session: SessionConfig::default(),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address to attach to (the server's realm)
    pub address: Address,
    /// Credential presented after the session is created
    pub credential: Credential,
    /// Handshake settings
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Config attaching to `address` with `credential` and default timings
    pub fn new(address: Address, credential: Credential) -> Self {
        Self { address, credential, session: SessionConfig::default() }
    }
}
