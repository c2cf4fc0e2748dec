//! Server behaviour observed at the byte level
//!
//! A raw peer talks to `Server::serve` over an in-memory duplex stream and
//! checks every byte the server writes.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use fast_core::{FastError, SessionConfig, capabilities::SessionFactory};
use fast_proto::{Address, SessionId};
use fast_server::{Server, ServerConfig, SystemEnv};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const HEADER: &str = "464153540100";

struct FixedSessions;

impl SessionFactory for FixedSessions {
    fn create_session(&self, _address: &Address) -> Result<SessionId, FastError> {
        Ok(SessionId::new(Bytes::from_static(b"12345"))?)
    }
}

fn server(config: ServerConfig) -> Arc<Server<SystemEnv>> {
    Arc::new(Server::new(config, SystemEnv).with_session_factory(Arc::new(FixedSessions)))
}

fn connect(server: &Arc<Server<SystemEnv>>) -> DuplexStream {
    let (peer, stream) = tokio::io::duplex(4096);
    let server = Arc::clone(server);
    tokio::spawn(async move { server.serve(stream).await });
    peer
}

async fn send(peer: &mut DuplexStream, hex_bytes: &str) {
    peer.write_all(&hex::decode(hex_bytes).unwrap()).await.unwrap();
}

async fn expect(peer: &mut DuplexStream, hex_bytes: &str) {
    let mut buf = vec![0u8; hex_bytes.len() / 2];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(hex::encode(buf), hex_bytes);
}

async fn rest(peer: &mut DuplexStream) -> String {
    let mut buf = Vec::new();
    peer.read_to_end(&mut buf).await.unwrap();
    hex::encode(buf)
}

#[tokio::test]
async fn handshake_and_delivery_byte_for_byte() {
    let server = server(ServerConfig::default());
    let mut alice = connect(&server);

    // header + ATTACH "example.com"
    send(&mut alice, &format!("{HEADER}010b6578616d706c652e636f6d")).await;
    expect(&mut alice, "04053132333435").await;

    // AUTHENTICATE "alice\np8ssw0rd"
    send(&mut alice, "020e616c6963650a7038737377307264").await;
    expect(&mut alice, "0311616c696365406578616d706c652e636f6d").await;

    // FETCH on an empty mailbox, then ask for an acknowledgment
    send(&mut alice, "05").await;
    send(&mut alice, "07").await;
    expect(&mut alice, "0800000000").await;

    // SEND bob@example.com → carol@example.com "hello" is queued for carol
    send(
        &mut alice,
        "06010000018bcfe568000f626f62406578616d706c652e636f6d116361726f6c406578616d706c652e636f6d0000000568656c6c6f",
    )
    .await;
    send(&mut alice, "07").await;
    expect(&mut alice, "0800000001").await;
    assert_eq!(server.registry().queued(&Address::try_from("carol@example.com").unwrap()), 1);

    // DETACH
    send(&mut alice, "ff").await;
    assert_eq!(rest(&mut alice).await, "");
}

#[tokio::test]
async fn mailbox_is_flushed_on_fetch_with_acknowledgment_request() {
    let server = server(ServerConfig::default());
    let mut bob = connect(&server);
    send(&mut bob, &format!("{HEADER}010b6578616d706c652e636f6d")).await;
    expect(&mut bob, "04053132333435").await;
    send(&mut bob, "020a626f620a736563726574").await;
    expect(&mut bob, "030f626f62406578616d706c652e636f6d").await;

    // bob → alice "hello" while alice is offline
    let packet = "0000018bcfe568000f626f62406578616d706c652e636f6d11616c696365406578616d706c652e636f6d0000000568656c6c6f";
    send(&mut bob, &format!("0601{packet}07")).await;
    expect(&mut bob, "0800000001").await;

    let mut alice = connect(&server);
    send(&mut alice, &format!("{HEADER}010b6578616d706c652e636f6d")).await;
    expect(&mut alice, "04053132333435").await;
    send(&mut alice, "020e616c6963650a7038737377307264").await;
    expect(&mut alice, "0311616c696365406578616d706c652e636f6d").await;
    send(&mut alice, "05").await;

    expect(&mut alice, &format!("0601{packet}")).await;
    expect(&mut alice, "07").await;

    // a wrong count makes the server retransmit the whole buffer
    send(&mut alice, "0800000000").await;
    expect(&mut alice, &format!("0601{packet}")).await;
    expect(&mut alice, "07").await;

    // two transmissions reached alice; the matching count clears the buffer
    send(&mut alice, "0800000002").await;
    send(&mut alice, "ff").await;
    assert_eq!(rest(&mut alice).await, "");
}

#[tokio::test]
async fn unknown_realm_gets_empty_session_then_detach() {
    let config = ServerConfig { realms: vec![Address::try_from("example.org").unwrap()], ..ServerConfig::default() };
    let server = server(config);
    let mut peer = connect(&server);

    send(&mut peer, &format!("{HEADER}010b6578616d706c652e636f6d")).await;

    assert_eq!(rest(&mut peer).await, "0400ff");
}

#[tokio::test]
async fn invalid_credential_gets_empty_identify_then_detach() {
    let server = server(ServerConfig::default());
    let mut peer = connect(&server);

    // a credential without the user line
    send(&mut peer, &format!("{HEADER}010b6578616d706c652e636f6d")).await;
    expect(&mut peer, "04053132333435").await;
    send(&mut peer, "0206736563726574").await;

    assert_eq!(rest(&mut peer).await, "0300ff");
}

#[tokio::test]
async fn bad_header_is_not_interpreted() {
    let server = server(ServerConfig::default());
    let mut peer = connect(&server);

    // "HTTP/1" followed by what would be a valid ATTACH
    send(&mut peer, "485454502f31010b6578616d706c652e636f6d").await;

    assert_eq!(rest(&mut peer).await, "ff");
}

#[tokio::test]
async fn attach_before_header_completes_is_buffered() {
    let server = server(ServerConfig::default());
    let mut peer = connect(&server);

    for byte in hex::decode(format!("{HEADER}010b6578616d706c652e636f6d")).unwrap() {
        peer.write_all(&[byte]).await.unwrap();
        tokio::task::yield_now().await;
    }

    expect(&mut peer, "04053132333435").await;
}

#[tokio::test(start_paused = true)]
async fn stalled_handshake_times_out() {
    let config = ServerConfig {
        session: SessionConfig { handshake_timeout: Duration::from_secs(5), tick_interval: Duration::from_secs(1) },
        ..ServerConfig::default()
    };
    let server = server(config);
    let mut peer = connect(&server);

    send(&mut peer, HEADER).await;
    let started = tokio::time::Instant::now();

    assert_eq!(rest(&mut peer).await, "ff");
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test]
async fn shutdown_detaches_open_connections() {
    let server = server(ServerConfig::default());
    let mut peer = connect(&server);
    send(&mut peer, &format!("{HEADER}010b6578616d706c652e636f6d")).await;
    expect(&mut peer, "04053132333435").await;

    server.shutdown();

    assert_eq!(rest(&mut peer).await, "ff");
}
