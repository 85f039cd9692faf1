//! End-to-end tests driving the hub through real WebSocket clients.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use relay_core::{Envelope, MessageType, Result};
use relay_hub::{Hooks, Hub, HubConfig, Session, SessionHook, SessionId, create_router};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Boots a hub on an ephemeral port and returns the ws URL plus the hub.
async fn boot(config: HubConfig, hooks: Hooks) -> (String, Arc<Hub>) {
    let hub = Hub::builder(config).hooks(hooks).build();
    hub.start();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(hub.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{addr}/ws"), hub)
}

async fn connect(base: &str, user: &str) -> WsStream {
    let (ws, _response) = connect_async(format!("{base}?user_id={user}")).await.unwrap();
    ws
}

async fn send_json(ws: &mut WsStream, value: &Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Receives the next envelope, skipping transport-level frames.
async fn recv_envelope(ws: &mut WsStream) -> Envelope {
    timeout(RECV_TIMEOUT, async {
        loop {
            match ws.next().await.expect("stream ended").expect("read failed") {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    })
    .await
    .expect("no envelope within timeout")
}

/// Asserts that no envelope arrives within the window.
async fn expect_silence(ws: &mut WsStream, window: Duration) {
    let result = timeout(window, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(_)) => {}
                Some(Err(_)) | None => {
                    std::future::pending::<String>().await;
                }
            }
        }
    })
    .await;
    assert!(result.is_err(), "unexpected envelope: {result:?}");
}

async fn join_channel(ws: &mut WsStream, channel: &str) {
    send_json(
        ws,
        &json!({"type": "system:presence", "channel": channel, "payload": {"action": "join"}}),
    )
    .await;
}

/// Reads frames until the connection goes quiet for `window`.
async fn drain(ws: &mut WsStream, window: Duration) {
    while timeout(window, ws.next()).await.is_ok_and(|f| f.is_some()) {}
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within deadline");
}

#[derive(Default)]
struct DisconnectCounter {
    count: AtomicUsize,
}

#[async_trait]
impl SessionHook for DisconnectCounter {
    async fn on_session(&self, _session: &Arc<Session>) -> Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn group_fan_out_excludes_sender() {
    let (url, hub) = boot(HubConfig::default(), Hooks::new()).await;

    let mut a = connect(&url, "a").await;
    let mut b = connect(&url, "b").await;
    let mut c = connect(&url, "c").await;

    join_channel(&mut a, "general").await;
    join_channel(&mut b, "general").await;
    join_channel(&mut c, "general").await;
    wait_until(|| hub.topology().sessions_of_channel("general").len() == 3).await;

    for ws in [&mut a, &mut b, &mut c] {
        drain(ws, Duration::from_millis(200)).await;
    }

    send_json(
        &mut a,
        &json!({
            "type": "chat:group",
            "channel": "general",
            "payload": {"content": "hi"},
            "trace_id": "t-1"
        }),
    )
    .await;

    let to_b = recv_envelope(&mut b).await;
    let to_c = recv_envelope(&mut c).await;

    assert_eq!(to_b.kind, MessageType::GroupChat);
    assert_eq!(to_b.payload_str("content"), Some("hi"));
    assert_eq!(to_b.sender, "a");
    assert_eq!(to_b.id, to_c.id);
    // unknown keys survive verbatim forwarding
    assert_eq!(to_b.rest.get("trace_id"), Some(&json!("t-1")));

    expect_silence(&mut a, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn private_chat_reaches_every_device_of_recipient() {
    let (url, hub) = boot(HubConfig::default(), Hooks::new()).await;

    let mut p = connect(&url, "u").await;
    let mut q = connect(&url, "u").await;
    let mut r = connect(&url, "v").await;
    wait_until(|| hub.topology().len() == 3).await;

    send_json(
        &mut r,
        &json!({"type": "chat:private", "recipient": "u", "payload": {"content": "yo"}}),
    )
    .await;

    let to_p = recv_envelope(&mut p).await;
    let to_q = recv_envelope(&mut q).await;
    assert_eq!(to_p.payload_str("content"), Some("yo"));
    assert_eq!(to_p.id, to_q.id);
    assert_eq!(to_p.sender, "v");

    expect_silence(&mut r, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn presence_join_announces_then_reports_roster() {
    let (url, hub) = boot(HubConfig::default(), Hooks::new()).await;

    let mut s = connect(&url, "alice").await;
    join_channel(&mut s, "dev").await;

    let joined = recv_envelope(&mut s).await;
    assert_eq!(joined.kind, MessageType::UserJoined);
    assert_eq!(joined.sender, "system");
    assert_eq!(joined.channel(), Some("dev"));
    assert_eq!(joined.payload_str("user"), Some("alice"));

    let presence = recv_envelope(&mut s).await;
    assert_eq!(presence.kind, MessageType::Presence);
    assert_eq!(presence.payload["users"], json!(["alice"]));

    let mut t = connect(&url, "bob").await;
    join_channel(&mut t, "dev").await;
    wait_until(|| hub.topology().sessions_of_channel("dev").len() == 2).await;

    for ws in [&mut s, &mut t] {
        let joined = recv_envelope(ws).await;
        assert_eq!(joined.kind, MessageType::UserJoined);
        assert_eq!(joined.payload_str("user"), Some("bob"));

        let presence = recv_envelope(ws).await;
        assert_eq!(presence.payload["users"], json!(["alice", "bob"]));
    }
}

#[tokio::test]
async fn slow_consumer_drops_without_stalling_others() {
    let config = HubConfig {
        outbox_capacity: 100,
        ..HubConfig::default()
    };
    let hub = Hub::builder(config).build();

    let (x, _rx_x) = Session::new(SessionId::generate(), "x", 100);
    let (y, mut rx_y) = Session::new(SessionId::generate(), "y", 100);
    hub.topology().register(x.clone()).unwrap();
    hub.topology().register(y.clone()).unwrap();
    hub.topology().subscribe(x.id(), "general").unwrap();
    hub.topology().subscribe(y.id(), "general").unwrap();

    // Fill x's outbox to capacity; y drains as it goes.
    let burst = Envelope::system(MessageType::GroupChat).with_channel("general");
    for _ in 0..100 {
        hub.send_to_channel("general", &burst, None);
        rx_y.try_recv().unwrap();
    }

    // The 101st envelope drops for x but still reaches y, and the send
    // completes without error.
    let delivered = hub.send_to_channel("general", &burst, None);
    assert_eq!(delivered, 1);
    rx_y.try_recv().unwrap();
}

#[tokio::test]
async fn keepalive_expiry_terminates_session_exactly_once() {
    let counter = Arc::new(DisconnectCounter::default());
    let config = HubConfig {
        pong_wait_secs: 1,
        ping_interval_secs: 60,
        ..HubConfig::default()
    };
    let hooks = Hooks::new().with_on_disconnect(counter.clone());
    let (url, hub) = boot(config, hooks).await;

    let mut z = connect(&url, "z").await;
    join_channel(&mut z, "dev").await;
    wait_until(|| hub.topology().sessions_of_channel("dev").len() == 1).await;

    // Stop reading and writing; the read deadline expires server-side.
    wait_until(|| hub.topology().is_empty()).await;
    assert!(hub.topology().sessions_of_channel("dev").is_empty());

    sleep(Duration::from_millis(200)).await;
    assert_eq!(counter.count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn capacity_ceiling_refuses_and_recovers() {
    let config = HubConfig {
        max_connections: 2,
        ..HubConfig::default()
    };
    let counter = Arc::new(DisconnectCounter::default());
    let hooks = Hooks::new().with_on_disconnect(counter.clone());
    let (url, hub) = boot(config, hooks).await;

    let _first = connect(&url, "a").await;
    let mut second = connect(&url, "b").await;
    wait_until(|| hub.topology().len() == 2).await;

    let err = connect_async(format!("{url}?user_id=c")).await.unwrap_err();
    match err {
        WsError::Http(response) => assert_eq!(response.status(), 503),
        other => panic!("expected HTTP refusal, got {other:?}"),
    }
    // The refused upgrade invoked no hooks.
    sleep(Duration::from_millis(100)).await;
    assert_eq!(counter.count.load(Ordering::SeqCst), 0);

    second.close(None).await.unwrap();
    wait_until(|| hub.topology().len() == 1).await;

    let _third = connect(&url, "c").await;
    wait_until(|| hub.topology().len() == 2).await;
    assert_eq!(counter.count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_frames_do_not_terminate_the_session() {
    let (url, hub) = boot(HubConfig::default(), Hooks::new()).await;

    let mut a = connect(&url, "a").await;
    let mut b = connect(&url, "b").await;
    join_channel(&mut a, "dev").await;
    join_channel(&mut b, "dev").await;
    wait_until(|| hub.topology().sessions_of_channel("dev").len() == 2).await;
    for ws in [&mut a, &mut b] {
        drain(ws, Duration::from_millis(200)).await;
    }

    a.send(Message::Text("{not json".into())).await.unwrap();

    // The session survives and keeps relaying.
    send_json(
        &mut a,
        &json!({"type": "chat:group", "channel": "dev", "payload": {"content": "still here"}}),
    )
    .await;
    let received = recv_envelope(&mut b).await;
    assert_eq!(received.payload_str("content"), Some("still here"));
    assert_eq!(hub.topology().len(), 2);
}

#[tokio::test]
async fn ingress_normalization_fills_id_sender_timestamp() {
    let (url, hub) = boot(HubConfig::default(), Hooks::new()).await;

    let mut a = connect(&url, "alice").await;
    let mut b = connect(&url, "bob").await;
    wait_until(|| hub.topology().len() == 2).await;

    // No id, sender, or timestamp; routed directly to bob.
    send_json(
        &mut a,
        &json!({"type": "chat:private", "recipient": "bob", "payload": {"content": "x"}}),
    )
    .await;

    let received = recv_envelope(&mut b).await;
    assert!(received.id.starts_with("msg_"));
    assert_eq!(received.sender, "alice");
    assert!(received.timestamp > 0);
}

#[tokio::test]
async fn synthesized_user_id_when_query_absent() {
    let (url, hub) = boot(HubConfig::default(), Hooks::new()).await;

    let (_ws, _response) = connect_async(url.as_str()).await.unwrap();
    wait_until(|| hub.topology().len() == 1).await;

    let infos = hub.topology().session_infos();
    assert!(infos[0].user_id.starts_with("user_"));
}
