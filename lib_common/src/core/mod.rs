//! # Core Engine Module
//!
//! The transport-agnostic heart of the relay. It knows nothing about HTTP or
//! WebSockets; it only sees connections through the [`Connection`] and
//! [`FrameSource`] traits.
//!
//! ## Core Components:
//!
//! - **`registry`**: the mutex-guarded set of live connections, with a one-shot
//!   `release` that deregisters and closes a connection exactly once.
//!
//! - **`dispatcher`**: the `Broadcaster` queue and its single delivery worker,
//!   which fans each message out to a registry snapshot and isolates per-member
//!   write failures.
//!
//! - **`session`**: the per-connection reader loop, with scoped cleanup that
//!   survives task cancellation.
//!
//! - **`frame`**: the timestamped `BroadcastMessage` and its wire rendering.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Outbound/inbound connection traits and the registry handle type.
pub mod connection;
/// The single-consumer broadcast queue and fan-out pass.
pub mod dispatcher;
/// Typed errors for connections and the relay.
pub mod error;
/// Timestamped broadcast frames.
pub mod frame;
/// Concurrent set of live connections.
pub mod registry;
/// Per-connection reader task.
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// --- Public API Re-exports ---
pub use connection::{Connection, ConnectionHandle, ConnectionId, FrameSource};
pub use dispatcher::{deliver, Broadcaster, DeliveryReport, WriteFailurePolicy};
pub use error::{ConnectionError, RelayError};
pub use frame::{BroadcastMessage, Payload, TimestampZone, TIMESTAMP_FORMAT};
pub use registry::Registry;
pub use session::{run_session, SessionEnd, SessionOptions, SessionSummary, DEFAULT_WELCOME};
