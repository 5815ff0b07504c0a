//! # Connection Abstractions
//!
//! A relay connection is split in two halves the moment it is accepted:
//!
//! - the **outbound** half ([`Connection`]) is shared. It lives in the
//!   [`Registry`](crate::core::registry::Registry) inside a [`ConnectionHandle`]
//!   and is written to by the broadcaster.
//! - the **inbound** half ([`FrameSource`]) is owned exclusively by the session
//!   task that reads from it.
//!
//! Keeping the halves apart means a session blocked on `receive()` never holds
//! anything the broadcaster needs.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::core::error::ConnectionError;
use crate::core::frame::Payload;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an accepted connection. Two handles are the same
/// member only when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next id.
    pub fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, as shown in log lines.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound half of a connection.
pub trait Connection: Send + Sync + 'static {
    /// Writes one text frame.
    fn send(&self, text: &str) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Closes the outbound half. Errors are swallowed: the connection is being
    /// discarded either way.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Inbound half of a connection.
pub trait FrameSource: Send + 'static {
    /// Waits for the next data frame. Any error, including an orderly close, is
    /// terminal for the connection.
    fn receive(&mut self) -> impl Future<Output = Result<Payload, ConnectionError>> + Send;
}

/// # Connection Handle
///
/// What the registry stores for each member: the outbound half plus its
/// identity and a one-shot release flag. The flag is what makes cleanup safe
/// to request from several places while only ever being performed once.
///
/// Whoever wins the release also wakes the session reading this connection,
/// so a member dropped by the broadcaster stops reading and publishing too.
pub struct ConnectionHandle<C> {
    id: ConnectionId,
    peer: String,
    connection: C,
    released: AtomicBool,
    release_signal: Notify,
}

impl<C: Connection> ConnectionHandle<C> {
    /// Wraps an accepted connection under a freshly allocated id.
    pub fn new(connection: C, peer: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            peer: peer.into(),
            connection,
            released: AtomicBool::new(false),
            release_signal: Notify::new(),
        })
    }

    /// Registry key of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address (or any label) used in log lines.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// The outbound half itself.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Writes one text frame to the peer.
    pub async fn send(&self, text: &str) -> Result<(), ConnectionError> {
        self.connection.send(text).await
    }

    /// `true` once the connection has been deregistered, whoever did it.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Resolves once the connection has been released. Meant for the single
    /// session reading this connection.
    pub async fn released(&self) {
        if self.is_released() {
            return;
        }
        // notify_one keeps a permit, so a release between the check and the
        // await is not lost.
        self.release_signal.notified().await;
    }

    /// Flips the release flag. Returns `true` only for the caller that won the
    /// race and therefore owns the cleanup.
    pub(crate) fn mark_released(&self) -> bool {
        let won = !self.released.swap(true, Ordering::AcqRel);
        if won {
            self.release_signal.notify_one();
        }
        won
    }
}

impl<C> fmt::Debug for ConnectionHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}
