//! # Broadcast Dispatcher
//!
//! The `Broadcaster` is the single sequential point through which every
//! inbound message reaches the registered connections. Sessions publish into
//! one ordered queue; exactly one delivery worker drains it.
//!
//! ## Core Design Principles:
//!
//! 1.  **One Consumer**: Because a single worker performs every fan-out, two
//!     broadcasts never interleave their writes, and messages reach members in
//!     publish order.
//!
//! 2.  **Snapshot, then I/O**: For each message the worker copies the registry
//!     and only then starts writing. The registry lock is never held during a
//!     `send`, and a connection registered after the copy does not receive that
//!     message.
//!
//! 3.  **Failure Isolation**: A failed `send` is logged and the pass moves on to
//!     the next member. Nothing is retried.
//!
//! 4.  **Unbounded Queue**: `publish` never blocks. There is no backpressure; a
//!     slow member slows the worker, not the sessions feeding it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::connection::{Connection, ConnectionId};
use crate::core::error::RelayError;
use crate::core::frame::BroadcastMessage;
use crate::core::registry::Registry;

/// What the delivery worker does with a member whose `send` failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteFailurePolicy {
    /// Log only. The member stays registered until its own session sees the
    /// read side fail.
    #[default]
    LogOnly,
    /// Release the member once the fan-out pass is over.
    Release,
}

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Members in the snapshot.
    pub attempted: usize,
    /// Members whose `send` succeeded.
    pub delivered: usize,
    /// Members whose `send` failed.
    pub failed: Vec<ConnectionId>,
}

/// Producer side of the broadcast queue. Cheap to clone; every session holds one.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: mpsc::UnboundedSender<BroadcastMessage>,
}

impl Broadcaster {
    /// Creates the queue and spawns its delivery worker on the current runtime.
    ///
    /// The worker runs until every `Broadcaster` clone is dropped and the queue
    /// is drained, or until the returned handle is aborted.
    pub fn spawn<C: Connection>(
        registry: Arc<Registry<C>>,
        policy: WriteFailurePolicy,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(registry, rx, policy));
        (Self { tx }, worker)
    }

    /// Queues `message` for delivery to every member registered when the
    /// worker dequeues it.
    pub fn publish(&self, message: BroadcastMessage) -> Result<(), RelayError> {
        self.tx.send(message).map_err(|_| RelayError::WorkerStopped)
    }
}

async fn run_worker<C: Connection>(
    registry: Arc<Registry<C>>,
    mut rx: mpsc::UnboundedReceiver<BroadcastMessage>,
    policy: WriteFailurePolicy,
) {
    info!("Broadcast worker started (write failure policy: {:?})", policy);
    while let Some(message) = rx.recv().await {
        deliver(&registry, &message, policy).await;
    }
    info!("Broadcast worker stopped: all publishers dropped");
}

/// # Deliver
///
/// One fan-out pass: snapshot the registry, render the message once, write it
/// to every member in the snapshot and, under [`WriteFailurePolicy::Release`],
/// release the members that failed after the pass is complete.
pub async fn deliver<C: Connection>(
    registry: &Registry<C>,
    message: &BroadcastMessage,
    policy: WriteFailurePolicy,
) -> DeliveryReport {
    let members = registry.snapshot();
    let text = message.render();
    let mut report = DeliveryReport {
        attempted: members.len(),
        ..DeliveryReport::default()
    };
    let mut failed = Vec::new();

    for member in &members {
        match member.send(&text).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("Write to client {} ({}) failed: {}", member.id(), member.peer(), e);
                report.failed.push(member.id());
                failed.push(member);
            }
        }
    }

    if policy == WriteFailurePolicy::Release {
        for member in failed {
            registry.release(member).await;
        }
    }

    debug!(
        "Broadcast delivered to {}/{} clients ({} failed)",
        report.delivered,
        report.attempted,
        report.failed.len()
    );
    report
}
