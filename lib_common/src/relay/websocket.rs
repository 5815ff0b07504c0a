//! Axum WebSocket adapter for the core connection traits.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::connection::{Connection, ConnectionHandle, FrameSource};
use crate::core::error::ConnectionError;
use crate::core::frame::Payload;
use crate::core::session::run_session;
use crate::relay::Relay;

/// Outbound half of an upgraded socket. The mutex serialises writes from the
/// broadcast worker with the session's welcome frame and close.
pub struct WsConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsConnection {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

impl Connection for WsConnection {
    async fn send(&self, text: &str) -> Result<(), ConnectionError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!("Error while closing websocket: {}", e);
        }
    }
}

/// Inbound half of an upgraded socket. Control frames are consumed here; only
/// text and binary frames surface as payloads.
pub struct WsFrames {
    stream: SplitStream<WebSocket>,
}

impl WsFrames {
    pub fn new(stream: SplitStream<WebSocket>) -> Self {
        Self { stream }
    }
}

impl FrameSource for WsFrames {
    async fn receive(&mut self) -> Result<Payload, ConnectionError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Payload::Text(text.as_str().to_owned())),
                Some(Ok(Message::Binary(bytes))) => return Ok(Payload::Binary(bytes.to_vec())),
                // Pings are answered by the transport itself.
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(ConnectionError::Closed),
                Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
            }
        }
    }
}

/// # WebSocket Upgrade Handler
///
/// Upgrades `GET /ws` and hands the socket to [`handle_socket`]. A failed
/// handshake is answered by Axum and never reaches the registry.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(relay): State<Relay>,
) -> impl IntoResponse {
    ws.on_failed_upgrade(move |e| warn!("WebSocket upgrade from {} failed: {}", addr, e))
        .on_upgrade(move |socket| handle_socket(socket, relay, addr))
}

/// Runs the session of one upgraded socket on the task Axum spawned for it.
async fn handle_socket(socket: WebSocket, relay: Relay, addr: SocketAddr) {
    let (sink, stream) = socket.split();
    let handle = ConnectionHandle::new(WsConnection::new(sink), addr.to_string());

    let summary = run_session(
        handle,
        WsFrames::new(stream),
        relay.registry().clone(),
        relay.broadcaster().clone(),
        relay.session_options(),
    )
    .await;

    debug!(
        "Session {} ended after {} frames ({})",
        summary.id, summary.published, summary.reason
    );
}
