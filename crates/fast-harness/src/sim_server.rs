//! Server and client wiring for turmoil hosts.

use std::{error::Error, sync::Arc};

use fast_proto::{Address, Credential};
use fast_server::{Client, ClientBuilder, ClientConfig, DEFAULT_PORT, Server};
use tracing::info;

use crate::{SimEnv, SimTransport};

/// Host name the simulated server runs under
pub const SERVER_HOST: &str = "server";

/// Realm every simulated client attaches to
pub const REALM: &str = "example.com";

/// Boxed error turmoil hosts and clients return
pub type SimError = Box<dyn Error>;

/// Serve `server` on [`DEFAULT_PORT`] inside the current host until it is
/// shut down.
pub async fn run_server(server: Arc<Server<SimEnv>>) -> Result<(), SimError> {
    let transport = SimTransport::bind(&format!("0.0.0.0:{DEFAULT_PORT}")).await?;
    info!(host = SERVER_HOST, "simulated server up");
    server.run(transport, std::future::pending()).await?;
    Ok(())
}

/// Client config for `user` in [`REALM`] with the password `secret`.
pub fn client_config(user: &str) -> Result<ClientConfig, SimError> {
    let address = Address::try_from(REALM)?;
    let credential = Credential::try_from(format!("{user}\nsecret").as_str())?;
    Ok(ClientConfig::new(address, credential))
}

/// Connect to [`SERVER_HOST`] and finish the handshake as `user`.
pub async fn connect_client(
    user: &str,
    env: SimEnv,
    configure: impl FnOnce(ClientBuilder<SimEnv>) -> ClientBuilder<SimEnv>,
) -> Result<Client<SimEnv>, SimError> {
    let stream = SimTransport::connect(&format!("{SERVER_HOST}:{DEFAULT_PORT}")).await?;
    let builder = configure(Client::builder(client_config(user)?, env));
    Ok(builder.connect(stream).await?)
}
