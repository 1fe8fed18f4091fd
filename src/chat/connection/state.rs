//! Connection state and the events a live connection reports.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chat::connection::transport::InboundFrame;

/// Lifecycle state of the streaming connection.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport is open.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Frames can be sent and received.
    Connected,
    /// The transport failed; cleared by the next close.
    Errored,
}

impl ConnectionState {
    /// Label shown to the user.
    #[must_use]
    pub const fn status_text(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Errored => "Error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_text())
    }
}

/// One notification from a live connection, delivered in transport order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionEvent {
    /// Handshake succeeded.
    Opened,
    /// One inbound frame.
    Fragment(InboundFrame),
    /// The remote end closed cleanly.
    Closed,
    /// The transport failed to open or broke.
    Errored(String),
}

impl ConnectionEvent {
    /// State the connection moves to after this event, if it changes.
    #[must_use]
    pub const fn next_state(&self) -> Option<ConnectionState> {
        match self {
            Self::Opened => Some(ConnectionState::Connected),
            Self::Fragment(_) => None,
            Self::Closed => Some(ConnectionState::Disconnected),
            Self::Errored(_) => Some(ConnectionState::Errored),
        }
    }
}
