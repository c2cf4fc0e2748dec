//! FAST server binary.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use fast_core::SessionConfig;
use fast_proto::Address;
use fast_server::{DEFAULT_PORT, Server, ServerConfig, ServerError, SystemEnv, TcpTransport};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// FAST store-and-forward message server
#[derive(Parser, Debug)]
#[command(name = "fast-server", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Realm clients may attach to (repeatable; default accepts any)
    #[arg(long = "realm")]
    realms: Vec<String>,

    /// Seconds a connection may take to complete the handshake
    #[arg(long, default_value_t = 30)]
    handshake_timeout: u64,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, ServerError> {
        let realms = self
            .realms
            .into_iter()
            .map(|realm| {
                Address::try_from(realm.as_str()).map_err(|source| ServerError::InvalidRealm { realm, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ServerConfig {
            bind: SocketAddr::new(self.bind, self.port),
            realms,
            session: SessionConfig {
                handshake_timeout: Duration::from_secs(self.handshake_timeout),
                ..SessionConfig::default()
            },
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Args::parse().into_config()?;
    info!(bind = %config.bind, realms = config.realms.len(), "starting FAST server");

    let transport = TcpTransport::bind(config.bind).await?;
    let server = Arc::new(Server::new(config, SystemEnv));
    server
        .run(transport, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
