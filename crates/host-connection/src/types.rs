//! Public types for the connection manager.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hostlink_protocol::{Message, MessageType};

/// Event name for a completed handshake.
pub const EVENT_CONNECT: &str = "connect";
/// Event name for a closed channel.
pub const EVENT_DISCONNECT: &str = "disconnect";
/// Event name for a successful automatic reconnection.
pub const EVENT_RECONNECT: &str = "reconnect";
/// Event name emitted once the reconnection budget is used up.
pub const EVENT_RECONNECT_FAILED: &str = "reconnect-failed";
/// Event name for download progress pushed by the host.
pub const EVENT_PROGRESS: &str = "progress";

/// Connection state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel is open.
    Disconnected,
    /// A channel is open and the handshake is in progress.
    Connecting,
    /// Handshake completed; requests may flow.
    Connected,
}

/// Events delivered to listeners registered on the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The handshake succeeded.
    Connect,
    /// The channel closed.
    Disconnect { intentional: bool },
    /// An automatic reconnection succeeded after `attempts` tries.
    Reconnect { attempts: u32 },
    /// Automatic reconnection gave up after `attempts` tries.
    ReconnectFailed { attempts: u32 },
    /// A `progress` push event from the host.
    Progress(Message),
    /// Any other typed push event from the host, named by its `type`,
    /// which may coincide with a lifecycle event name.
    Push(Message),
}

impl ClientEvent {
    /// Returns the name listeners subscribe to for this event.
    ///
    /// Push events are named after their wire `type`.
    pub fn name(&self) -> &str {
        match self {
            Self::Connect => EVENT_CONNECT,
            Self::Disconnect { .. } => EVENT_DISCONNECT,
            Self::Reconnect { .. } => EVENT_RECONNECT,
            Self::ReconnectFailed { .. } => EVENT_RECONNECT_FAILED,
            Self::Progress(_) => EVENT_PROGRESS,
            Self::Push(msg) => msg.msg_type.as_ref().map(MessageType::as_str).unwrap_or(""),
        }
    }

    /// Returns the host message carried by push events.
    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Progress(msg) | Self::Push(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Handle returned when registering an event listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(String);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time view of the connection's health.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    /// Wall-clock time of the last resolved request.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Time elapsed since the last resolved request.
    pub last_success_age: Option<Duration>,
    pub pending_requests: usize,
}
