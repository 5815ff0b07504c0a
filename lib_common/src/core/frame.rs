//! # Broadcast Frames
//!
//! The immutable value that flows from a session, through the broadcaster queue,
//! to every registered connection. A frame carries the raw inbound payload and
//! the wall-clock time it was read, and renders to the outbound wire text
//! `[YYYY-MM-DD HH:MM:SS]: <payload>`.

use std::borrow::Cow;
use std::fmt;

use chrono::{Local, Utc};

/// strftime pattern of the timestamp prefix, second precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Clock used to stamp frames. Must stay fixed for the lifetime of a relay so
/// every client sees timestamps in the same zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampZone {
    /// Server local time.
    #[default]
    Local,
    /// Coordinated Universal Time.
    Utc,
}

impl TimestampZone {
    /// Current wall-clock time formatted with [`TIMESTAMP_FORMAT`].
    pub fn now_formatted(self) -> String {
        match self {
            TimestampZone::Local => Local::now().format(TIMESTAMP_FORMAT).to_string(),
            TimestampZone::Utc => Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Raw inbound frame. Both variants are opaque to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame, relayed as lossy UTF-8.
    Binary(Vec<u8>),
}

impl Payload {
    /// Payload as UTF-8. Binary frames are decoded lossily.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(text) => Cow::Borrowed(text.as_str()),
            Payload::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    /// Size in bytes as received.
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

/// # Broadcast Message
///
/// A payload stamped with the time its session read it. Constructed once per
/// inbound frame and never mutated afterwards; the broadcaster renders it a
/// single time per delivery pass and writes the same text to every member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    timestamp: String,
    payload: Payload,
}

impl BroadcastMessage {
    /// Stamps `payload` with the current time in `zone`.
    pub fn stamped(payload: Payload, zone: TimestampZone) -> Self {
        Self {
            timestamp: zone.now_formatted(),
            payload,
        }
    }

    /// Builds a message with an already formatted timestamp.
    pub fn with_timestamp(timestamp: impl Into<String>, payload: Payload) -> Self {
        Self {
            timestamp: timestamp.into(),
            payload,
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Outbound wire text.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BroadcastMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]: {}", self.timestamp, self.payload.as_text())
    }
}
