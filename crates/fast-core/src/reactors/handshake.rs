//! Handshake reactors.
//!
//! Each server-side check is its own reactor, backed by one capability.
//! [`ClientHandshake`] drives the initiator side.

use std::sync::Arc;

use fast_proto::{Address, Credential, Frame, Reply, SessionId};
use tracing::debug;

use crate::{
    capabilities::{AddressVerifier, Authenticator, SessionFactory},
    channel::Channel,
    error::{FastError, Result},
    pipeline::{Event, Reactor},
    session::{SessionAction, SessionState},
};

/// Rejects ATTACH requests for addresses the server does not serve
#[derive(Clone)]
pub struct AddressFilter {
    verifier: Arc<dyn AddressVerifier>,
}

impl AddressFilter {
    /// Filter consulting `verifier`
    pub fn new(verifier: Arc<dyn AddressVerifier>) -> Self {
        Self { verifier }
    }
}

impl Reactor for AddressFilter {
    fn on_attach_requested(&self, _channel: &Channel, address: &Address) -> Result<()> {
        self.verifier.verify(address)
    }
}

/// Answers an accepted ATTACH with a fresh SESSION.
///
/// After writing the reply it dispatches `SessionCreated` on the channel so
/// the rest of the pipeline (the reliability ledger in particular) sees the
/// new session.
#[derive(Clone)]
pub struct SessionCreator {
    factory: Arc<dyn SessionFactory>,
}

impl SessionCreator {
    /// Creator drawing ids from `factory`
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }
}

impl Reactor for SessionCreator {
    fn on_attach_requested(&self, channel: &Channel, address: &Address) -> Result<()> {
        channel.with_session(|session| session.attach(address.clone()))?;
        let session_id = self.factory.create_session(address)?;

        channel.write_frame(&Frame::Session(Reply::Accepted(session_id.clone())))?;
        channel.with_session(|session| session.establish(session_id.clone()))?;
        channel.dispatch(&Event::SessionCreated(session_id));
        Ok(())
    }
}

/// Authenticates credentials against the attached realm and answers with
/// IDENTIFY
#[derive(Clone)]
pub struct CredentialAuthenticator {
    authenticator: Arc<dyn Authenticator>,
}

impl CredentialAuthenticator {
    /// Authenticator reactor backed by `authenticator`
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl Reactor for CredentialAuthenticator {
    fn on_credential_received(&self, channel: &Channel, credential: &Credential) -> Result<()> {
        let realm = channel.with_session(|session| -> Result<Address> {
            session.require(SessionState::SessionEstablished, "authenticate")?;
            session.attached_address().cloned().ok_or(FastError::NotIdentified)
        })?;

        let identity = self.authenticator.authenticate(&realm, credential)?;
        channel.with_session(|session| session.authenticate())?;
        channel.write_frame(&Frame::Identify(Reply::Accepted(identity.clone())))?;
        channel.with_session(|session| session.identify(identity))?;
        Ok(())
    }
}

/// Initiator side of the handshake.
///
/// Attaches once connected, submits the credential once the session is
/// created, and fetches the mailbox once identified.
pub struct ClientHandshake {
    address: Address,
    credential: Credential,
}

impl ClientHandshake {
    /// Handshake attaching to `address` with `credential`
    pub fn new(address: Address, credential: Credential) -> Self {
        Self { address, credential }
    }

    fn execute(&self, channel: &Channel, actions: Vec<SessionAction>) -> Result<()> {
        for action in actions {
            match action {
                SessionAction::SubmitCredential => {
                    channel.write_frame(&Frame::Authenticate(self.credential.clone()))?;
                    channel.with_session(|session| session.authenticate())?;
                },
                SessionAction::Fetch => {
                    debug!(channel = %channel.id(), "fetching mailbox");
                    channel.write_frame(&Frame::Fetch)?;
                },
            }
        }
        Ok(())
    }
}

impl Reactor for ClientHandshake {
    fn on_connected(&self, channel: &Channel) -> Result<()> {
        channel.write_frame(&Frame::Attach(self.address.clone()))?;
        channel.with_session(|session| session.attach(self.address.clone()))?;
        Ok(())
    }

    fn on_session_created(&self, channel: &Channel, session_id: &SessionId) -> Result<()> {
        let actions = channel.with_session(|session| session.establish(session_id.clone()))?;
        self.execute(channel, actions)
    }

    fn on_identity_received(&self, channel: &Channel, identity: &Address) -> Result<()> {
        let actions = channel.with_session(|session| session.identify(identity.clone()))?;
        self.execute(channel, actions)
    }
}
