//! The per-session transport loop.
//!
//! Each accepted socket runs two tasks: a reader that decodes and normalizes
//! inbound envelopes, and a writer that drains the outbox and emits
//! keepalive pings. They share nothing but the session handle; teardown is
//! driven from the reader's scope once either side stops.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, error, info, warn};

use relay_core::Envelope;

use crate::hub::Hub;
use crate::session::Session;

/// Waits until `closed` reports `true`, without holding the receiver's
/// borrow guard across an await point (which would make the future `!Send`).
async fn wait_closed(closed: &mut tokio::sync::watch::Receiver<bool>) {
    loop {
        if *closed.borrow() {
            return;
        }
        if closed.changed().await.is_err() {
            return;
        }
    }
}

/// Runs a registered session until it terminates, then performs the
/// supervised teardown: close, writer join, disconnect hook, unregister.
pub(crate) async fn run_session(
    hub: Arc<Hub>,
    socket: WebSocket,
    session: Arc<Session>,
    outbox_rx: mpsc::Receiver<Envelope>,
) {
    let (sink, stream) = socket.split();

    let writer = tokio::spawn(writer_loop(hub.clone(), session.clone(), outbox_rx, sink));
    reader_loop(&hub, &session, stream).await;

    // registered -> terminating -> terminal
    session.close();
    let _ = writer.await;

    if let Some(removed) = hub.topology().unregister(session.id()) {
        hub.hooks().run_disconnect(&removed).await;
        info!(
            session_id = %removed.id(),
            user_id = %removed.user_id(),
            "session closed"
        );
    }
}

/// Reads frames until transport error, peer close, read-deadline expiry, or
/// shutdown. Every inbound frame refreshes the deadline.
async fn reader_loop(hub: &Arc<Hub>, session: &Arc<Session>, mut stream: SplitStream<WebSocket>) {
    let pong_wait = hub.config().pong_wait();
    let mut shutdown = hub.shutdown_controller().subscribe();
    let mut closed = session.closed_signal();

    loop {
        let frame = tokio::select! {
            _ = shutdown.recv() => break,
            _ = wait_closed(&mut closed) => break,
            read = timeout(pong_wait, stream.next()) => match read {
                Err(_) => {
                    info!(session_id = %session.id(), "read deadline expired");
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(error))) => {
                    debug!(session_id = %session.id(), %error, "transport read error");
                    break;
                }
                Ok(Some(Ok(frame))) => frame,
            },
        };

        match frame {
            Message::Text(text) => {
                if !handle_frame(hub, session, text.as_str()).await {
                    break;
                }
            }
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    if !handle_frame(hub, session, text).await {
                        break;
                    }
                }
                Err(_) => {
                    warn!(session_id = %session.id(), "non-UTF-8 binary frame dropped");
                }
            },
            Message::Pong(_) => session.touch(),
            // axum answers pings automatically
            Message::Ping(_) => {}
            Message::Close(_) => break,
        }
    }
}

/// Decodes, normalizes, and queues one frame.
///
/// Returns false only when the session must stop (the dispatch queue is
/// gone); malformed frames and vetoed envelopes drop without ending the
/// session.
async fn handle_frame(hub: &Arc<Hub>, session: &Arc<Session>, text: &str) -> bool {
    let mut envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(session_id = %session.id(), %error, "malformed envelope dropped");
            return true;
        }
    };

    session.touch();
    envelope.normalize(session.user_id());

    if let Err(error) = hub.hooks().run_before(session, &mut envelope).await {
        warn!(
            session_id = %session.id(),
            message_id = %envelope.id,
            %error,
            "envelope rejected by before-dispatch hook"
        );
        return true;
    }

    hub.enqueue_dispatch(session.clone(), envelope).await.is_ok()
}

/// Drains the outbox and emits keepalive pings until the session turns
/// terminal, the peer stops accepting writes, or shutdown.
async fn writer_loop(
    hub: Arc<Hub>,
    session: Arc<Session>,
    mut outbox_rx: mpsc::Receiver<Envelope>,
    mut sink: SplitSink<WebSocket, Message>,
) {
    let ping_interval = hub.config().ping_interval();
    let write_timeout = hub.config().write_timeout();
    let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
    let mut shutdown = hub.shutdown_controller().subscribe();
    let mut closed = session.closed_signal();

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = wait_closed(&mut closed) => break,
            _ = ticker.tick() => {
                if !send_frame(&mut sink, Message::Ping(Vec::new().into()), write_timeout, &session).await {
                    break;
                }
            }
            maybe = outbox_rx.recv() => {
                let Some(envelope) = maybe else { break };
                match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        if !send_frame(&mut sink, Message::Text(json.into()), write_timeout, &session).await {
                            break;
                        }
                    }
                    Err(error) => {
                        error!(session_id = %session.id(), %error, "failed to serialize envelope");
                    }
                }
            }
        }
    }

    // A writer failure must terminate the whole session, not just this task.
    session.close();
    let _ = sink.close().await;
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: Message,
    deadline: Duration,
    session: &Arc<Session>,
) -> bool {
    match timeout(deadline, sink.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            debug!(session_id = %session.id(), %error, "transport write error");
            false
        }
        Err(_) => {
            warn!(session_id = %session.id(), "write deadline exceeded");
            false
        }
    }
}
