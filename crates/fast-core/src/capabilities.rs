//! Pluggable policies consulted during the handshake.
//!
//! The reactors only see these traits; a server picks the implementations.
//! Simple strategies are provided for the common cases: accept any address
//! or a fixed whitelist, a credential table, an automatic authenticator that
//! registers identities on first use, and random session ids.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, PoisonError},
};

use bytes::Bytes;
use fast_proto::{Address, Credential, Packet, SessionId};

use crate::{env::Environment, error::FastError};

/// Decides which addresses a peer may attach to
pub trait AddressVerifier: Send + Sync {
    /// Accept or reject an ATTACH.
    ///
    /// # Errors
    ///
    /// [`FastError::UnknownAddress`] if the address is not served here.
    fn verify(&self, address: &Address) -> Result<(), FastError>;
}

/// Maps `(realm, credential)` to an identity
pub trait Authenticator: Send + Sync {
    /// Authenticate a credential presented to `realm`.
    ///
    /// # Errors
    ///
    /// [`FastError::InvalidCredential`] if the credential is not accepted.
    fn authenticate(&self, realm: &Address, credential: &Credential) -> Result<Address, FastError>;
}

/// Assigns session ids to accepted attach requests
pub trait SessionFactory: Send + Sync {
    /// New session id for a peer attached to `address`
    fn create_session(&self, address: &Address) -> Result<SessionId, FastError>;
}

/// Observes packets flowing through a channel
#[allow(unused_variables)]
pub trait PacketListener: Send + Sync {
    /// Packet written to the peer
    fn on_packet_sent(&self, packet: &Packet) {}

    /// Packet received from the peer
    fn on_packet_received(&self, packet: &Packet) {}
}

/// Observes the client-side connection lifecycle
#[allow(unused_variables)]
pub trait ConnectionListener: Send + Sync {
    /// Handshake finished with this identity
    fn on_connected(&self, identity: &Address) {}

    /// Connection closed
    fn on_disconnected(&self) {}
}

/// Accepts every address
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyAddress;

impl AddressVerifier for AcceptAnyAddress {
    fn verify(&self, _address: &Address) -> Result<(), FastError> {
        Ok(())
    }
}

/// Accepts only the listed addresses
#[derive(Debug, Clone, Default)]
pub struct AddressWhitelist {
    allowed: HashSet<Address>,
}

impl AddressWhitelist {
    /// Whitelist of `addresses`
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self { allowed: addresses.into_iter().collect() }
    }

    /// Allow one more address
    pub fn allow(&mut self, address: Address) {
        self.allowed.insert(address);
    }
}

impl AddressVerifier for AddressWhitelist {
    fn verify(&self, address: &Address) -> Result<(), FastError> {
        if self.allowed.contains(address) {
            Ok(())
        } else {
            Err(FastError::UnknownAddress(address.clone()))
        }
    }
}

type Realms = HashMap<Address, HashMap<Credential, Address>>;

/// Per-realm table of accepted credentials
///
/// Keys are owned [`Credential`]s, so a rejected or dropped entry is wiped.
#[derive(Default)]
pub struct CredentialTable {
    realms: Mutex<Realms>,
}

impl CredentialTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `credential` in `realm` as `identity`
    pub fn accept_credential(&self, realm: &Address, credential: &Credential, identity: Address) {
        self.lock()
            .entry(realm.clone())
            .or_default()
            .insert(credential.clone(), identity);
    }

    /// Stop accepting `credential` in `realm`
    pub fn reject_credential(&self, realm: &Address, credential: &Credential) {
        if let Some(credentials) = self.lock().get_mut(realm) {
            credentials.remove(credential);
        }
    }

    /// Identity bound to `credential` in `realm`
    pub fn lookup(&self, realm: &Address, credential: &Credential) -> Option<Address> {
        self.lock().get(realm)?.get(credential).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Realms> {
        self.realms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Authenticator for CredentialTable {
    fn authenticate(&self, realm: &Address, credential: &Credential) -> Result<Address, FastError> {
        self.lookup(realm, credential).ok_or(FastError::InvalidCredential)
    }
}

/// Registers identities on first use.
///
/// Credentials have the form `user\nsecret` and map to the identity
/// `user@realm`. The first credential presented for an identity claims it;
/// later logins must present the same credential.
#[derive(Default)]
pub struct AutomaticAuthenticator {
    table: CredentialTable,
    claimed: Mutex<HashSet<Address>>,
}

impl AutomaticAuthenticator {
    /// Authenticator with no claimed identities
    pub fn new() -> Self {
        Self::default()
    }

    fn identity_for(realm: &Address, credential: &Credential) -> Result<Address, FastError> {
        let bytes = credential.as_bytes();
        let user = bytes
            .iter()
            .position(|&byte| byte == b'\n')
            .map(|newline| &bytes[..newline])
            .filter(|user| !user.is_empty())
            .ok_or(FastError::InvalidCredential)?;

        let mut identity = Vec::with_capacity(user.len() + 1 + realm.len());
        identity.extend_from_slice(user);
        identity.push(b'@');
        identity.extend_from_slice(realm.as_bytes());
        Address::new(Bytes::from(identity)).map_err(|_| FastError::InvalidCredential)
    }
}

impl Authenticator for AutomaticAuthenticator {
    fn authenticate(&self, realm: &Address, credential: &Credential) -> Result<Address, FastError> {
        let identity = Self::identity_for(realm, credential)?;
        {
            let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
            if claimed.insert(identity.clone()) {
                self.table.accept_credential(realm, credential, identity);
            }
        }
        self.table.authenticate(realm, credential)
    }
}

/// Random 8-hex-digit session ids
#[derive(Debug, Clone)]
pub struct RandomSessionFactory<E> {
    env: E,
}

impl<E: Environment> RandomSessionFactory<E> {
    /// Factory drawing randomness from `env`
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

impl<E: Environment> SessionFactory for RandomSessionFactory<E> {
    fn create_session(&self, _address: &Address) -> Result<SessionId, FastError> {
        let hex = format!("{:08x}", self.env.random_u32());
        Ok(SessionId::new(Bytes::from(hex.into_bytes()))?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn address(value: &str) -> Address {
        Address::try_from(value).unwrap()
    }

    fn credential(value: &str) -> Credential {
        Credential::try_from(value).unwrap()
    }

    #[derive(Clone)]
    struct CountingEnv;

    impl Environment for CountingEnv {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn unix_millis(&self) -> i64 {
            0
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for (index, byte) in buffer.iter_mut().enumerate() {
                *byte = index as u8 + 1;
            }
        }
    }

    #[test]
    fn whitelist_rejects_unlisted_addresses() {
        let whitelist = AddressWhitelist::new([address("example.com")]);
        assert!(whitelist.verify(&address("example.com")).is_ok());
        assert_eq!(
            whitelist.verify(&address("example.org")),
            Err(FastError::UnknownAddress(address("example.org")))
        );
    }

    #[test]
    fn credential_table_is_scoped_by_realm() {
        let table = CredentialTable::new();
        let realm = address("example.com");
        table.accept_credential(&realm, &credential("alice\np8ssw0rd"), address("alice@example.com"));

        assert_eq!(
            table.authenticate(&realm, &credential("alice\np8ssw0rd")),
            Ok(address("alice@example.com"))
        );
        assert_eq!(
            table.authenticate(&address("example.org"), &credential("alice\np8ssw0rd")),
            Err(FastError::InvalidCredential)
        );

        table.reject_credential(&realm, &credential("alice\np8ssw0rd"));
        assert!(table.lookup(&realm, &credential("alice\np8ssw0rd")).is_none());
    }

    #[test]
    fn credential_table_owns_its_keys() {
        let table = CredentialTable::new();
        let realm = address("example.com");
        let presented = credential("bob\nhunter2");
        table.accept_credential(&realm, &presented, address("bob@example.com"));
        drop(presented);

        assert_eq!(table.lookup(&realm, &credential("bob\nhunter2")), Some(address("bob@example.com")));
        assert!(table.lookup(&realm, &credential("bob\nhunter3")).is_none());

        table.reject_credential(&realm, &credential("bob\nhunter2"));
        assert!(table.lock().get(&realm).is_some_and(HashMap::is_empty));
    }

    #[test]
    fn automatic_authenticator_claims_identity_on_first_use() {
        let auth = AutomaticAuthenticator::new();
        let realm = address("example.com");

        assert_eq!(
            auth.authenticate(&realm, &credential("alice\np8ssw0rd")),
            Ok(address("alice@example.com"))
        );
        assert_eq!(
            auth.authenticate(&realm, &credential("alice\np8ssw0rd")),
            Ok(address("alice@example.com"))
        );
        assert_eq!(
            auth.authenticate(&realm, &credential("alice\nguess")),
            Err(FastError::InvalidCredential)
        );
    }

    #[test]
    fn automatic_authenticator_requires_user_line() {
        let auth = AutomaticAuthenticator::new();
        let realm = address("example.com");
        assert_eq!(auth.authenticate(&realm, &credential("no-newline")), Err(FastError::InvalidCredential));
        assert_eq!(auth.authenticate(&realm, &credential("\nsecret")), Err(FastError::InvalidCredential));
    }

    #[test]
    fn random_session_ids_are_hex() {
        let factory = RandomSessionFactory::new(CountingEnv);
        let session = factory.create_session(&address("example.com")).unwrap();
        assert_eq!(session.as_bytes(), b"01020304");
    }
}
