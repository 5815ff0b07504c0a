//! In-memory connections for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::connection::{Connection, FrameSource};
use crate::core::error::ConnectionError;
use crate::core::frame::Payload;

/// Outbound half that records every frame written to it.
#[derive(Default)]
pub struct MockConnection {
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    closes: AtomicUsize,
    failing: AtomicBool,
}

impl MockConnection {
    pub fn healthy() -> Self {
        Self::default()
    }

    /// A connection whose every `send` fails.
    pub fn failing() -> Self {
        let conn = Self::default();
        conn.failing.store(true, Ordering::SeqCst);
        conn
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Connection for MockConnection {
    async fn send(&self, text: &str) -> Result<(), ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConnectionError::Transport("broken pipe".to_string()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Inbound half driven by the test through an unbounded channel. Dropping the
/// sender reads as an orderly close.
pub struct ScriptedFrames {
    rx: mpsc::UnboundedReceiver<Result<Payload, ConnectionError>>,
}

impl ScriptedFrames {
    pub fn new() -> (mpsc::UnboundedSender<Result<Payload, ConnectionError>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

impl FrameSource for ScriptedFrames {
    async fn receive(&mut self) -> Result<Payload, ConnectionError> {
        self.rx.recv().await.unwrap_or(Err(ConnectionError::Closed))
    }
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
