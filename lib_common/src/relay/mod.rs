//! # WebSocket Relay Gateway
//!
//! Wires the core engine to the network. A [`Relay`] owns the shared
//! [`Registry`] and a [`Broadcaster`] whose delivery worker it spawns on
//! start; [`Relay::router`] exposes it over Axum:
//!
//! - `GET /ws`: WebSocket upgrade. Every text or binary frame a client sends is
//!   rebroadcast to all connected clients (the sender included) as
//!   `[YYYY-MM-DD HH:MM:SS]: <payload>`.
//! - `GET /health`: liveness probe, answers `OK`.
//!
//! Origins are not checked.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::core::dispatcher::{Broadcaster, WriteFailurePolicy};
use crate::core::error::RelayError;
use crate::core::registry::Registry;
use crate::core::session::SessionOptions;

/// Axum WebSocket implementations of the core connection traits.
pub mod websocket;

pub use websocket::{WsConnection, WsFrames};

/// Tunables of a relay instance.
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    pub session: SessionOptions,
    pub write_failure: WriteFailurePolicy,
}

/// # Relay
///
/// Shared state handed to every request handler. Cloning is cheap: all clones
/// point at the same registry and the same broadcast queue.
#[derive(Clone)]
pub struct Relay {
    registry: Arc<Registry<WsConnection>>,
    broadcaster: Broadcaster,
    session: Arc<SessionOptions>,
}

impl Relay {
    /// Builds the registry and spawns the broadcast worker on the current
    /// runtime. The worker stops once every clone of the relay (and every
    /// session) is gone, or when the returned handle is aborted.
    pub fn start(options: RelayOptions) -> (Self, JoinHandle<()>) {
        let registry = Arc::new(Registry::new());
        let (broadcaster, worker) = Broadcaster::spawn(Arc::clone(&registry), options.write_failure);
        let relay = Self {
            registry,
            broadcaster,
            session: Arc::new(options.session),
        };
        (relay, worker)
    }

    pub fn registry(&self) -> &Arc<Registry<WsConnection>> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn session_options(&self) -> &SessionOptions {
        &self.session
    }

    /// Routes of the gateway, with the relay as shared state.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(websocket::ws_handler))
            .with_state(self.clone())
    }
}

/// # Health Check Endpoint
///
/// Answers "OK" for load balancers and uptime checkers.
async fn health_handler() -> &'static str {
    "OK"
}

/// # Serve
///
/// Serves the relay on an already bound `listener` until `shutdown` resolves.
/// Binding is left to the caller so that a bind failure, the only fatal error
/// of the process, is reported before anything is spawned.
pub async fn serve<F>(listener: TcpListener, relay: Relay, shutdown: F) -> Result<(), RelayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("Relay listening on ws://{}/ws", addr);

    axum::serve(
        listener,
        relay.router().into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    info!("Relay on {} stopped accepting connections", addr);
    Ok(())
}
