//! Per-connection driver.
//!
//! Owns one byte stream for its whole life:
//!
//! ```text
//!             ┌──────────── read loop (this task) ─────────────┐
//!   stream ──>│ FrameReader ──> Channel::receive ──> Pipeline  │
//!             │      ▲ tick: handshake deadline                 │
//!             │      ▲ channel closed / shutdown                │
//!             └────────────────────────────────────────────────┘
//!   stream <── write_loop task <── Outbound queue <── Channel
//! ```
//!
//! The initiator opens the connection by queueing the header and
//! dispatching `Connected`; the responder does the same once the peer's
//! header has been validated. Whatever ends the loop, `Disconnected` is
//! dispatched exactly once and the writer is allowed to drain.

use std::future::Future;

use fast_core::{
    Channel, Environment, Event, FastError, Outbound, ReadError, Role, Session, SessionState,
    stream::{FrameReader, write_loop},
};
use fast_proto::Frame;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, watch},
    time::{self, MissedTickBehavior},
};
use tracing::{debug, trace};

enum Inbound {
    Header,
    Frame(Frame),
    Eof,
}

/// Drive `channel` over `stream` until the connection ends.
///
/// `shutdown` resolving detaches the channel.
pub async fn drive<S, E>(
    stream: S,
    channel: Channel,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    env: E,
    shutdown: impl Future<Output = ()> + Send,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
    E: Environment,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let writer = tokio::spawn(write_loop(write_half, outbound, channel.clone()));

    let mut greeted = channel.role() == Role::Initiator;
    if greeted {
        open(&channel);
    }

    let mut reader = FrameReader::new(read_half);
    let mut state = channel.subscribe();
    let mut ticker = time::interval(channel.with_session(|session| session.config().tick_interval));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            () = closed(&mut state) => {
                trace!(channel = %channel.id(), "channel closed locally");
                break;
            },
            () = &mut shutdown => {
                debug!(channel = %channel.id(), "shutting down");
                channel.detach();
                break;
            },
            _ = ticker.tick() => {
                if let Some(elapsed) = channel.with_session(|session| session.check_timeout(env.now())) {
                    channel.raise(FastError::HandshakeTimeout { elapsed });
                    break;
                }
            },
            inbound = next_inbound(&mut reader, greeted) => match inbound {
                Ok(Inbound::Header) => {
                    greeted = true;
                    open(&channel);
                },
                Ok(Inbound::Frame(frame)) => {
                    if channel.receive(frame).is_break() {
                        break;
                    }
                },
                Ok(Inbound::Eof) => {
                    debug!(channel = %channel.id(), "peer closed the stream");
                    break;
                },
                Err(err) => {
                    channel.raise(FastError::Read(err));
                    break;
                },
            },
        }
    }

    channel.finish();
    if let Err(err) = writer.await {
        debug!(channel = %channel.id(), %err, "writer task failed");
    }
}

/// Queue the header (initiator only) and announce the connection.
fn open(channel: &Channel) {
    if channel.role() == Role::Initiator {
        if let Err(err) = channel.write_header() {
            channel.raise(err);
            return;
        }
    }
    if let Err(err) = channel.with_session(Session::connect) {
        channel.raise(err.into());
        return;
    }
    channel.dispatch(&Event::Connected);
}

async fn next_inbound<R>(reader: &mut FrameReader<R>, greeted: bool) -> Result<Inbound, ReadError>
where
    R: AsyncRead + Unpin,
{
    if !greeted {
        reader.read_header().await?;
        return Ok(Inbound::Header);
    }
    Ok(reader.read_frame().await?.map_or(Inbound::Eof, Inbound::Frame))
}

async fn closed(state: &mut watch::Receiver<SessionState>) {
    let _ = state.wait_for(|state| *state == SessionState::Closed).await;
}
