//! # Client Session
//!
//! One session per accepted connection. It greets the client, registers the
//! outbound half, and then loops on the inbound half forwarding every frame to
//! the broadcaster until the first read failure.
//!
//! Cleanup is scoped: from the moment the connection is registered a
//! [`SessionGuard`] owns its release. The normal exit path releases explicitly;
//! if the task is aborted or panics, the guard's `Drop` deregisters
//! synchronously and hands the close to the runtime.
//!
//! A session also ends when someone else releases its connection, e.g. the
//! broadcaster under [`WriteFailurePolicy::Release`](crate::core::dispatcher::WriteFailurePolicy).
//! A released connection never publishes again.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::connection::{Connection, ConnectionHandle, ConnectionId, FrameSource};
use crate::core::dispatcher::Broadcaster;
use crate::core::error::ConnectionError;
use crate::core::frame::{BroadcastMessage, TimestampZone};
use crate::core::registry::Registry;

/// Greeting sent to every client right after the upgrade.
pub const DEFAULT_WELCOME: &str = "Welcome!";

/// Per-session settings shared by every connection of a relay.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// First text frame sent to a new client, before it joins the broadcast.
    pub welcome: String,
    /// Clock used to stamp the frames this session publishes.
    pub zone: TimestampZone,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            welcome: DEFAULT_WELCOME.to_string(),
            zone: TimestampZone::default(),
        }
    }
}

/// Why a session stopped reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// `receive` failed or the peer closed.
    Read(ConnectionError),
    /// The connection was released elsewhere while the session was reading.
    Released,
    /// The broadcast worker is gone, so frames have nowhere to go.
    WorkerStopped,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Read(e) => write!(f, "{}", e),
            SessionEnd::Released => write!(f, "released by the relay"),
            SessionEnd::WorkerStopped => write!(f, "broadcast worker stopped"),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Connection the session was reading.
    pub id: ConnectionId,
    /// Frames read from the client and handed to the broadcaster.
    pub published: u64,
    /// What stopped the read loop.
    pub reason: SessionEnd,
}

/// Owns the release of a registered connection until it is performed.
struct SessionGuard<C: Connection> {
    registry: Arc<Registry<C>>,
    handle: Arc<ConnectionHandle<C>>,
}

impl<C: Connection> SessionGuard<C> {
    async fn release(&self) -> bool {
        self.registry.release(&self.handle).await
    }
}

impl<C: Connection> Drop for SessionGuard<C> {
    fn drop(&mut self) {
        if !self.registry.release_now(&self.handle) {
            return;
        }
        warn!("Client {} ({}) session torn down, releasing", self.handle.id(), self.handle.peer());
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let handle = Arc::clone(&self.handle);
            runtime.spawn(async move { handle.connection().close().await });
        }
    }
}

/// # Run Session
///
/// Drives one connection from upgrade to release.
///
/// 1.  Sends the welcome frame. A failure here is logged only; the read loop
///     will notice a dead peer on its own.
/// 2.  Registers the connection so it starts receiving broadcasts.
/// 3.  Reads frames, stamping each and publishing it, until `receive` fails,
///     the connection is released elsewhere or the worker is gone.
/// 4.  Releases the connection (deregister + close, exactly once).
pub async fn run_session<C, S>(
    handle: Arc<ConnectionHandle<C>>,
    mut source: S,
    registry: Arc<Registry<C>>,
    broadcaster: Broadcaster,
    options: &SessionOptions,
) -> SessionSummary
where
    C: Connection,
    S: FrameSource,
{
    let id = handle.id();

    if let Err(e) = handle.send(&options.welcome).await {
        warn!("Failed to greet client {} ({}): {}", id, handle.peer(), e);
    }

    registry.add(Arc::clone(&handle));
    let guard = SessionGuard {
        registry,
        handle,
    };
    info!("Client {} ({}) connected", id, guard.handle.peer());

    let mut published = 0u64;
    let reason = loop {
        let received = tokio::select! {
            biased;
            _ = guard.handle.released() => {
                info!("Client {} ({}) released by the relay", id, guard.handle.peer());
                break SessionEnd::Released;
            }
            received = source.receive() => received,
        };

        match received {
            Ok(payload) => {
                debug!("Client {} sent {} bytes", id, payload.len());
                let message = BroadcastMessage::stamped(payload, options.zone);
                if let Err(e) = broadcaster.publish(message) {
                    warn!("Dropping frame from client {}: {}", id, e);
                    break SessionEnd::WorkerStopped;
                }
                published += 1;
            }
            Err(e) => {
                if e.is_closed() {
                    info!("Client {} ({}) disconnected", id, guard.handle.peer());
                } else {
                    warn!("Read from client {} ({}) failed: {}", id, guard.handle.peer(), e);
                }
                break SessionEnd::Read(e);
            }
        }
    };

    guard.release().await;

    SessionSummary {
        id,
        published,
        reason,
    }
}
