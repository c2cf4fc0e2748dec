//! Handshake and delivery through wired pipelines
//!
//! A client and a server channel are connected back to back in memory:
//! frames queued on one side are decoded and fed to the other's
//! `Channel::receive`. No sockets, no runtime.

use std::{
    ops::ControlFlow,
    sync::{Arc, Mutex},
    time::Instant,
};

use bytes::Bytes;
use fast_core::{
    Channel, Environment, Event, FastError, Outbound, Pipeline, Registry, Role, Session,
    SessionConfig, SessionState,
    capabilities::{AcceptAnyAddress, AddressWhitelist, AutomaticAuthenticator, ConnectionListener, RandomSessionFactory},
    reactors::{
        AddressFilter, ClientHandshake, ConnectionObserver, CredentialAuthenticator, DetachOnException, EventLog,
        FlushOnFetch, PacketDelivery, ReliableDelivery, RouteAttachment, SessionCreator,
    },
};
use fast_proto::{Address, ConnectionHeader, Credential, Frame, Packet};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Clone)]
struct FixedEnv;

impl Environment for FixedEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        1_700_000_000_000
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0xAB);
    }
}

#[derive(Default)]
struct Connections {
    log: Mutex<Vec<String>>,
}

impl ConnectionListener for Connections {
    fn on_connected(&self, identity: &Address) {
        self.log.lock().unwrap().push(format!("connected {identity}"));
    }

    fn on_disconnected(&self) {
        self.log.lock().unwrap().push("disconnected".to_owned());
    }
}

fn address(value: &str) -> Address {
    Address::try_from(value).unwrap()
}

fn credential(value: &str) -> Credential {
    Credential::new(value.as_bytes()).unwrap()
}

struct Server {
    registry: Arc<Registry>,
    verifier: Arc<dyn fast_core::capabilities::AddressVerifier>,
    authenticator: Arc<AutomaticAuthenticator>,
}

impl Server {
    fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            verifier: Arc::new(AcceptAnyAddress),
            authenticator: Arc::new(AutomaticAuthenticator::new()),
        }
    }

    fn accept(&self) -> End {
        let pipeline = Pipeline::new()
            .with(EventLog)
            .with(DetachOnException)
            .with(ReliableDelivery::new())
            .with(AddressFilter::new(self.verifier.clone()))
            .with(SessionCreator::new(Arc::new(RandomSessionFactory::new(FixedEnv))))
            .with(CredentialAuthenticator::new(self.authenticator.clone()))
            .with(PacketDelivery::new(self.registry.clone()))
            .with(FlushOnFetch::new(self.registry.clone()))
            .with(RouteAttachment::new(self.registry.clone()));
        End::new(Role::Responder, pipeline)
    }
}

struct End {
    channel: Channel,
    outbound: UnboundedReceiver<Outbound>,
}

impl End {
    fn new(role: Role, pipeline: Pipeline) -> Self {
        let session = Session::new(role, Instant::now(), SessionConfig::default());
        let (channel, outbound) = Channel::new(session, pipeline);
        Self { channel, outbound }
    }

    fn client(domain: &str, secret: &str, listener: Arc<Connections>) -> Self {
        let pipeline = Pipeline::new()
            .with(EventLog)
            .with(DetachOnException)
            .with(ReliableDelivery::new())
            .with(ConnectionObserver::new(listener))
            .with(ClientHandshake::new(address(domain), credential(secret)));
        Self::new(Role::Initiator, pipeline)
    }

    fn open(&self) {
        if self.channel.role() == Role::Initiator {
            self.channel.write_header().unwrap();
        }
        self.channel.with_session(Session::connect).unwrap();
        self.channel.dispatch(&Event::Connected);
    }

    /// Decoded frames queued since the last call
    fn take_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(Outbound::Frame(bytes)) = self.outbound.try_recv() {
            let mut rest = &bytes[..];
            if rest.starts_with(&ConnectionHeader::MAGIC) {
                rest = &rest[ConnectionHeader::SIZE..];
            }
            while !rest.is_empty() {
                let (frame, used) = Frame::decode(rest).unwrap();
                frames.push(frame);
                rest = &rest[used..];
            }
        }
        frames
    }
}

/// Shuttle frames both ways until neither side has anything queued.
///
/// Returns every frame that crossed, tagged with its direction.
fn pump(client: &mut End, server: &mut End) -> Vec<(&'static str, Frame)> {
    let mut transcript = Vec::new();
    loop {
        let upstream = client.take_frames();
        let downstream = server.take_frames();
        if upstream.is_empty() && downstream.is_empty() {
            return transcript;
        }
        for frame in upstream {
            transcript.push(("c→s", frame.clone()));
            if !server.channel.is_closed() && server.channel.receive(frame) == ControlFlow::Break(()) {
                server.channel.finish();
            }
        }
        for frame in downstream {
            transcript.push(("s→c", frame.clone()));
            if !client.channel.is_closed() && client.channel.receive(frame) == ControlFlow::Break(()) {
                client.channel.finish();
            }
        }
    }
}

fn connect(server: &Server, secret: &str, listener: Arc<Connections>) -> (End, End) {
    let mut client = End::client("example.com", secret, listener);
    let mut server_end = server.accept();
    server_end.open();
    client.open();
    pump(&mut client, &mut server_end);
    (client, server_end)
}

fn commands(transcript: &[(&'static str, Frame)]) -> Vec<String> {
    transcript
        .iter()
        .map(|(direction, frame)| format!("{direction} {:?}", frame.command().unwrap()))
        .collect()
}

#[test]
fn handshake_runs_to_identified_on_both_sides() {
    let server = Server::new();
    let listener = Arc::new(Connections::default());
    let mut client = End::client("example.com", "alice\np8ssw0rd", listener.clone());
    let mut server_end = server.accept();

    server_end.open();
    client.open();
    let transcript = pump(&mut client, &mut server_end);

    assert_eq!(
        commands(&transcript),
        vec!["c→s Attach", "s→c Session", "c→s Authenticate", "s→c Identify", "c→s Fetch"]
    );
    assert_eq!(client.channel.state(), SessionState::Identified);
    assert_eq!(server_end.channel.state(), SessionState::Identified);
    assert_eq!(client.channel.identity(), Some(address("alice@example.com")));
    assert_eq!(server_end.channel.identity(), Some(address("alice@example.com")));
    assert_eq!(client.channel.session_id(), server_end.channel.session_id());
    assert_eq!(
        server_end.channel.session_id().map(|id| id.as_bytes().to_vec()),
        Some(b"abababab".to_vec())
    );
    assert_eq!(*listener.log.lock().unwrap(), vec!["connected alice@example.com"]);
    assert_eq!(server.registry.channels(&address("alice@example.com")), vec![server_end.channel.clone()]);
}

#[test]
fn unknown_address_is_rejected_with_empty_session() {
    let mut server = Server::new();
    server.verifier = Arc::new(AddressWhitelist::new([address("example.org")]));
    let listener = Arc::new(Connections::default());
    let mut client = End::client("example.com", "alice\nsecret", listener.clone());
    let mut server_end = server.accept();

    server_end.open();
    client.open();
    let transcript = pump(&mut client, &mut server_end);

    assert_eq!(transcript[1].1, Frame::Session(fast_proto::Reply::Rejected));
    assert_eq!(transcript[2].1, Frame::Detach);
    assert_eq!(server_end.channel.last_error(), Some(FastError::UnknownAddress(address("example.com"))));
    assert_eq!(client.channel.last_error(), Some(FastError::GreetingRejected));
    assert!(client.channel.is_closed());
    assert!(server_end.channel.is_closed());
}

#[test]
fn wrong_credential_is_rejected_with_empty_identify() {
    let server = Server::new();
    let (alice, _) = connect(&server, "alice\nright", Arc::new(Connections::default()));
    assert_eq!(alice.channel.state(), SessionState::Identified);

    let (impostor, server_end) = connect(&server, "alice\nwrong", Arc::new(Connections::default()));

    assert_eq!(server_end.channel.last_error(), Some(FastError::InvalidCredential));
    assert_eq!(impostor.channel.last_error(), Some(FastError::AuthenticationRejected));
    assert!(impostor.channel.is_closed());
    assert_eq!(impostor.channel.identity(), None);
}

#[test]
fn queued_packets_are_flushed_on_login_and_acknowledged() {
    let server = Server::new();
    let bob = address("bob@example.com");
    let alice = address("alice@example.com");
    for payload in ["one", "two"] {
        server.registry.route_packet(Packet::new(1, bob.clone(), alice.clone(), payload).unwrap());
    }

    let mut client = End::client("example.com", "alice\nsecret", Arc::new(Connections::default()));
    let mut server_end = server.accept();
    server_end.open();
    client.open();
    let transcript = pump(&mut client, &mut server_end);

    let tail: Vec<String> = commands(&transcript).into_iter().skip(5).collect();
    assert_eq!(tail, vec!["s→c Send", "s→c RequestAcknowledgment", "c→s Acknowledge"]);
    let (_, Frame::Send(delivered)) = &transcript[5] else { unreachable!() };
    let payloads: Vec<Bytes> = delivered.iter().map(|packet| packet.payload().clone()).collect();
    assert_eq!(payloads, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
    assert_eq!(transcript[7].1, Frame::Acknowledge(2));
    assert_eq!(server.registry.queued(&alice), 0);
}

#[test]
fn live_packet_is_routed_between_identified_clients() {
    let server = Server::new();
    let (mut alice, mut alice_server) = connect(&server, "alice\na", Arc::new(Connections::default()));
    let (mut bob, mut bob_server) = connect(&server, "bob\nb", Arc::new(Connections::default()));

    let packet = Packet::new(5, address("bob@example.com"), address("alice@example.com"), "hi").unwrap();
    bob.channel.send_packets(std::slice::from_ref(&packet)).unwrap();
    pump(&mut bob, &mut bob_server);

    let delivered = pump(&mut alice, &mut alice_server);
    assert_eq!(delivered[0], ("s→c", Frame::Send(vec![packet])));
    assert_eq!(server.registry.queued(&address("alice@example.com")), 0);
}

#[test]
fn disconnect_releases_routes_once() {
    let server = Server::new();
    let listener = Arc::new(Connections::default());
    let (mut client, mut server_end) = connect(&server, "alice\nsecret", listener.clone());

    client.channel.detach();
    client.channel.finish();
    client.channel.finish();
    pump(&mut client, &mut server_end);

    assert!(server_end.channel.is_closed());
    assert!(server.registry.channels(&address("alice@example.com")).is_empty());
    assert_eq!(*listener.log.lock().unwrap(), vec!["connected alice@example.com", "disconnected"]);
}
