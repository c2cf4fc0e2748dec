//! Client connector against a live server
//!
//! Both ends run the real runtime over in-memory duplex streams.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use fast_core::{
    FastError,
    capabilities::{ConnectionListener, PacketListener},
};
use fast_proto::{Address, Credential, Packet};
use fast_server::{Client, ClientConfig, Server, ServerConfig, SystemEnv};
use tokio::{sync::mpsc, time::timeout};

const WAIT: Duration = Duration::from_secs(5);

struct Inbox(mpsc::UnboundedSender<Packet>);

impl PacketListener for Inbox {
    fn on_packet_received(&self, packet: &Packet) {
        let _ = self.0.send(packet.clone());
    }
}

#[derive(Default)]
struct Lifecycle(Mutex<Vec<String>>);

impl ConnectionListener for Lifecycle {
    fn on_connected(&self, identity: &Address) {
        self.0.lock().unwrap().push(format!("connected {identity}"));
    }

    fn on_disconnected(&self) {
        self.0.lock().unwrap().push("disconnected".to_owned());
    }
}

fn address(value: &str) -> Address {
    Address::try_from(value).unwrap()
}

fn config(user: &str) -> ClientConfig {
    ClientConfig::new(address("example.com"), Credential::try_from(format!("{user}\nsecret").as_str()).unwrap())
}

fn server(config: ServerConfig) -> Arc<Server<SystemEnv>> {
    Arc::new(Server::new(config, SystemEnv))
}

fn open(server: &Arc<Server<SystemEnv>>) -> tokio::io::DuplexStream {
    let (client, stream) = tokio::io::duplex(64 * 1024);
    let server = Arc::clone(server);
    tokio::spawn(async move { server.serve(stream).await });
    client
}

async fn login(server: &Arc<Server<SystemEnv>>, user: &str) -> (Client<SystemEnv>, mpsc::UnboundedReceiver<Packet>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = Client::builder(config(user), SystemEnv)
        .packet_listener(Arc::new(Inbox(tx)))
        .connect(open(server))
        .await
        .unwrap();
    (client, rx)
}

async fn acknowledged(client: &Client<SystemEnv>) {
    timeout(WAIT, async {
        while !client.ledger().unacknowledged().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn connect_returns_identified_client() {
    let server = server(ServerConfig::default());
    let lifecycle = Arc::new(Lifecycle::default());

    let client = Client::builder(config("alice"), SystemEnv)
        .connection_listener(lifecycle.clone())
        .connect(open(&server))
        .await
        .unwrap();

    assert_eq!(client.identity(), Some(address("alice@example.com")));
    client.detach().await;
    assert_eq!(*lifecycle.0.lock().unwrap(), vec!["connected alice@example.com", "disconnected"]);
}

#[tokio::test]
async fn rejected_realm_fails_connect() {
    let server = server(ServerConfig { realms: vec![address("example.org")], ..ServerConfig::default() });

    let result = Client::builder(config("alice"), SystemEnv).connect(open(&server)).await;

    assert!(matches!(result, Err(FastError::GreetingRejected)));
}

#[tokio::test]
async fn wrong_credential_fails_connect() {
    let server = server(ServerConfig::default());
    let (first, _inbox) = login(&server, "alice").await;

    let impostor = ClientConfig::new(address("example.com"), Credential::try_from("alice\nguess").unwrap());
    let result = Client::builder(impostor, SystemEnv).connect(open(&server)).await;

    assert!(matches!(result, Err(FastError::AuthenticationRejected)));
    assert!(!first.is_closed());
}

#[tokio::test]
async fn live_packet_reaches_every_device() {
    let server = server(ServerConfig::default());
    let (_phone, mut phone_inbox) = login(&server, "alice").await;
    let (_laptop, mut laptop_inbox) = login(&server, "alice").await;
    let (bob, _) = login(&server, "bob").await;

    bob.send(address("alice@example.com"), "hi alice").unwrap();

    for inbox in [&mut phone_inbox, &mut laptop_inbox] {
        let packet = timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
        assert_eq!(packet.from(), &address("bob@example.com"));
        assert_eq!(packet.payload(), &Bytes::from_static(b"hi alice"));
    }
}

#[tokio::test]
async fn offline_packets_arrive_in_order_on_login() {
    let server = server(ServerConfig::default());
    let (bob, _) = login(&server, "bob").await;
    for payload in ["first", "second", "third"] {
        bob.send(address("alice@example.com"), payload).unwrap();
    }
    bob.request_acknowledgment().unwrap();
    acknowledged(&bob).await;
    assert_eq!(server.registry().queued(&address("alice@example.com")), 3);

    let (alice, mut inbox) = login(&server, "alice").await;
    let mut payloads = Vec::new();
    for _ in 0..3 {
        payloads.push(timeout(WAIT, inbox.recv()).await.unwrap().unwrap().payload().clone());
    }

    assert_eq!(payloads, vec![Bytes::from_static(b"first"), Bytes::from_static(b"second"), Bytes::from_static(b"third")]);
    assert_eq!(alice.ledger().received_count(), 3);
    assert_eq!(server.registry().queued(&address("alice@example.com")), 0);
}

#[tokio::test]
async fn acknowledged_packets_leave_the_ledger() {
    let server = server(ServerConfig::default());
    let (bob, _) = login(&server, "bob").await;

    bob.send(address("carol@example.com"), "one").unwrap();
    bob.send(address("carol@example.com"), "two").unwrap();
    assert_eq!(bob.ledger().unacknowledged().len(), 2);

    bob.request_acknowledgment().unwrap();
    acknowledged(&bob).await;
    assert_eq!(bob.ledger().sent_count(), 2);
}

#[tokio::test]
async fn restored_snapshot_resends_unacknowledged_packets() {
    let server = server(ServerConfig::default());
    let (bob, _) = login(&server, "bob").await;
    bob.send(address("carol@example.com"), "maybe lost").unwrap();
    let snapshot = bob.save_state();
    bob.detach().await;

    let (bob, _) = login(&server, "bob").await;
    assert!(bob.restore_state(&snapshot).unwrap());
    acknowledged(&bob).await;

    // at-least-once: the packet may now be queued twice
    assert_eq!(bob.ledger().sent_count(), 1);
    assert_eq!(server.registry().queued(&address("carol@example.com")), 2);
}

#[tokio::test]
async fn unknown_snapshot_version_sends_nothing() {
    let server = server(ServerConfig::default());
    let (bob, _) = login(&server, "bob").await;

    let mut snapshot = vec![0u8; 16];
    snapshot[3] = 9;
    assert!(!bob.restore_state(&snapshot).unwrap());
    assert_eq!(bob.ledger().sent_count(), 0);
}

#[tokio::test]
async fn detached_client_cannot_write() {
    let server = server(ServerConfig::default());
    let (bob, _) = login(&server, "bob").await;
    let channel = bob.channel().clone();
    bob.detach().await;

    assert!(matches!(channel.write_frame(&fast_proto::Frame::Fetch), Err(FastError::Write(_))));
}
