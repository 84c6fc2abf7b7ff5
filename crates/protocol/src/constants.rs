use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time allowed for the ping/pong handshake after a channel opens.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default timeout for request/response operations.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a connected client probes the host.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for a single health probe.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_millis(2000);

/// Age of the last successful message after which the channel is considered dead.
pub const STALE_THRESHOLD: Duration = Duration::from_secs(60);

/// Fixed delay between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Reconnection attempts made after an unsolicited close before giving up.
pub const MAX_RECONNECTS: u32 = 5;

/// Largest message a host may send to the client (1 MiB).
pub const MAX_INBOUND_MESSAGE_SIZE: usize = 1024 * 1024;

/// Largest message the client may send to a host (64 MiB).
pub const MAX_OUTBOUND_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Size of the length prefix in front of every message.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Message type identifier carried in the `type` field.
///
/// Unknown names are kept verbatim in [`MessageType::Other`] so push events
/// of types this crate does not know about can still be routed by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    // Connection management
    Ping,
    Pong,
    HealthCheck,

    // Requests to the host
    GetMediaInfo,
    Download,
    CancelDownload,
    GetDownloadLocations,
    GeneratePreview,

    // Push events from the host
    Progress,

    Other(String),
}

impl MessageType {
    /// Returns the wire name of this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::HealthCheck => "healthCheck",
            Self::GetMediaInfo => "get_media_info",
            Self::Download => "download",
            Self::CancelDownload => "cancel_download",
            Self::GetDownloadLocations => "get_download_locations",
            Self::GeneratePreview => "generatePreview",
            Self::Progress => "progress",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for MessageType {
    fn from(name: &str) -> Self {
        match name {
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "healthCheck" => Self::HealthCheck,
            "get_media_info" => Self::GetMediaInfo,
            "download" => Self::Download,
            "cancel_download" => Self::CancelDownload,
            "get_download_locations" => Self::GetDownloadLocations,
            "generatePreview" => Self::GeneratePreview,
            "progress" => Self::Progress,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for MessageType {
    fn from(name: String) -> Self {
        match MessageType::from(name.as_str()) {
            Self::Other(_) => Self::Other(name),
            known => known,
        }
    }
}

impl From<MessageType> for String {
    fn from(msg_type: MessageType) -> Self {
        match msg_type {
            MessageType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
