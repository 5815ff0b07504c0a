//! # Relay End-to-End Tests
//!
//! Runs the real Axum gateway on an ephemeral localhost port and drives it
//! with `tokio-tungstenite` clients.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lib_common::core::SessionOptions;
use lib_common::relay::{Relay, RelayOptions, serve};
use regex::Regex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(2);

struct TestRelay {
    addr: SocketAddr,
    relay: Relay,
    _stop: oneshot::Sender<()>,
}

impl TestRelay {
    async fn start(options: RelayOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let (relay, _worker) = Relay::start(options);
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(serve(listener, relay.clone(), async move {
            let _ = stopped.await;
        }));
        Self {
            addr,
            relay,
            _stop: stop,
        }
    }

    async fn connect(&self) -> Client {
        let (client, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("websocket handshake");
        client
    }

    async fn wait_for_members(&self, expected: usize) {
        let registry = self.relay.registry();
        timeout(WAIT, async {
            while registry.len() != expected {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {} members, have {}", expected, registry.len()));
    }
}

async fn next_text(client: &mut Client) -> String {
    timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    })
    .await
    .expect("timed out waiting for a text frame")
}

async fn assert_silent(client: &mut Client) {
    let next = timeout(Duration::from_millis(200), client.next()).await;
    assert!(next.is_err(), "unexpected frame: {:?}", next);
}

fn broadcast_line(payload: &str) -> Regex {
    Regex::new(&format!(
        r"^\[\d{{4}}-\d{{2}}-\d{{2}} \d{{2}}:\d{{2}}:\d{{2}}\]: {}$",
        regex::escape(payload)
    ))
    .unwrap()
}

#[tokio::test]
async fn test_late_joiner_only_sees_messages_after_joining() {
    let server = TestRelay::start(RelayOptions::default()).await;

    let mut a = server.connect().await;
    assert_eq!(next_text(&mut a).await, "Welcome!");
    server.wait_for_members(1).await;

    a.send(Message::text("hello")).await.unwrap();
    // Self-echo: the sender is a member too.
    let echoed = next_text(&mut a).await;
    assert!(broadcast_line("hello").is_match(&echoed), "got {echoed}");

    let mut b = server.connect().await;
    assert_eq!(next_text(&mut b).await, "Welcome!");
    server.wait_for_members(2).await;

    a.send(Message::text("hi")).await.unwrap();
    let at_a = next_text(&mut a).await;
    let at_b = next_text(&mut b).await;
    assert!(broadcast_line("hi").is_match(&at_a), "got {at_a}");
    assert!(broadcast_line("hi").is_match(&at_b), "got {at_b}");
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn test_binary_frames_are_relayed_as_text() {
    let server = TestRelay::start(RelayOptions::default()).await;
    let mut a = server.connect().await;
    next_text(&mut a).await;
    server.wait_for_members(1).await;

    a.send(Message::binary(b"raw bytes".to_vec())).await.unwrap();

    let got = next_text(&mut a).await;
    assert!(broadcast_line("raw bytes").is_match(&got), "got {got}");
}

#[tokio::test]
async fn test_disconnected_client_is_deregistered() {
    let server = TestRelay::start(RelayOptions::default()).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    let mut c = server.connect().await;
    for client in [&mut a, &mut b, &mut c] {
        next_text(client).await;
    }
    server.wait_for_members(3).await;

    b.close(None).await.unwrap();
    server.wait_for_members(2).await;

    a.send(Message::text("still here")).await.unwrap();
    assert!(broadcast_line("still here").is_match(&next_text(&mut a).await));
    assert!(broadcast_line("still here").is_match(&next_text(&mut c).await));
}

#[tokio::test]
async fn test_every_message_reaches_every_client_once_in_sender_order() {
    let server = TestRelay::start(RelayOptions::default()).await;
    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut client = server.connect().await;
        next_text(&mut client).await;
        clients.push(client);
    }
    server.wait_for_members(3).await;

    for (sender, client) in clients.iter_mut().enumerate() {
        for seq in 0..5 {
            client
                .send(Message::text(format!("c{sender}-m{seq}")))
                .await
                .unwrap();
        }
    }

    let payload = Regex::new(r"\]: c(\d)-m(\d)$").unwrap();
    for client in clients.iter_mut() {
        let mut seen: HashMap<u32, Vec<u32>> = HashMap::new();
        for _ in 0..15 {
            let text = next_text(client).await;
            let caps = payload.captures(&text).expect("relayed frame");
            let sender: u32 = caps[1].parse().unwrap();
            let seq: u32 = caps[2].parse().unwrap();
            seen.entry(sender).or_default().push(seq);
        }
        for sender in 0..3u32 {
            assert_eq!(seen.get(&sender), Some(&vec![0, 1, 2, 3, 4]));
        }
        assert_silent(client).await;
    }
}

#[tokio::test]
async fn test_custom_welcome() {
    let server = TestRelay::start(RelayOptions {
        session: SessionOptions {
            welcome: "hey there".to_string(),
            ..SessionOptions::default()
        },
        ..RelayOptions::default()
    })
    .await;

    let mut a = server.connect().await;
    assert_eq!(next_text(&mut a).await, "hey there");
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestRelay::start(RelayOptions::default()).await;
    let body = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "OK");
}
