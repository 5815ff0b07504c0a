use thiserror::Error;

/// I/O failure on a single connection. Always terminal for that connection and
/// never propagated to any other one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Orderly close from the peer, or the stream simply ended.
    #[error("connection closed by peer")]
    Closed,

    /// The socket failed underneath the frame layer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer sent something the frame layer could not accept.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ConnectionError {
    /// `true` for an orderly close, which is logged at a lower level than a real failure.
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionError::Closed)
    }
}

/// Relay-wide failures, as opposed to per-connection ones.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The delivery worker has exited and its queue is closed.
    #[error("broadcast delivery worker is no longer running")]
    WorkerStopped,

    /// Listener or server I/O failure.
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
}
