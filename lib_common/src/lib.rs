//! # lib_common
//!
//! Shared building blocks for the relay server. Every top-level folder is gated
//! behind a cargo feature of the same name so binaries only pull in what they use.
//!
//! - `core`: transport-agnostic connection registry, broadcaster and sessions.
//! - `relay`: the Axum WebSocket gateway wired on top of `core`.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "relay")]
pub mod relay;
