//! Typed events emitted by the real-time channel.

use serde::Serialize;

use crate::messages::{RemoteAlertError, RemoteAlertSent};

/// Connection state machine:
/// `Disconnected -> Connecting -> Connected -> Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Observer-facing events. Consumers must not mutate limiter or registry
/// state in response to these.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    StateChanged(ConnectionState),
    RemoteAlertSent(RemoteAlertSent),
    RemoteAlertError(RemoteAlertError),
}
