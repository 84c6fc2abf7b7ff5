//! Error types for the transport and the RPC client.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while opening or running a transport channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(
        "invalid native host name {0:?}: only lowercase letters, digits, '_' and '.' are allowed"
    )]
    InvalidHostName(String),

    #[error("no manifest for native host {host} (searched: {searched})")]
    ManifestNotFound { host: String, searched: String },

    #[error("invalid native host manifest {}: {reason}", path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    #[error(
        "origin {origin} is not listed in allowed_origins of {}; check the native host manifest",
        path.display()
    )]
    OriginNotAllowed { origin: String, path: PathBuf },

    #[error("failed to start native host {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("transport closed")]
    Closed,
}

/// Errors returned to callers of the RPC client.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("not connected to native host {host_id}: {detail}")]
    NotConnected { host_id: String, detail: String },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("request {id} timed out after {}ms", after.as_millis())]
    Timeout { id: String, after: Duration },

    #[error("disconnected: {0}")]
    Disconnected(String),

    #[error("native host error: {message}")]
    Host { id: String, message: String },

    #[error("duplicate request id {0}")]
    DuplicateId(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    /// Returns `true` if the request ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the request was rejected because the channel closed.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_display() {
        let err = RpcError::Timeout {
            id: "r1".into(),
            after: Duration::from_millis(100),
        };
        assert_eq!(err.to_string(), "request r1 timed out after 100ms");
        assert!(err.is_timeout());

        let err = RpcError::Disconnected("native host disconnected".into());
        assert_eq!(err.to_string(), "disconnected: native host disconnected");
        assert!(err.is_disconnect());

        let err = RpcError::Host {
            id: "r2".into(),
            message: "unsupported site".into(),
        };
        assert_eq!(err.to_string(), "native host error: unsupported site");
    }

    #[test]
    fn origin_error_points_at_manifest() {
        let err = TransportError::OriginNotAllowed {
            origin: "chrome-extension://abc/".into(),
            path: PathBuf::from("/tmp/com.example.host.json"),
        };
        let text = err.to_string();
        assert!(text.contains("allowed_origins"));
        assert!(text.contains("/tmp/com.example.host.json"));
    }

    #[test]
    fn transport_error_is_transparent() {
        let err: RpcError = TransportError::Closed.into();
        assert_eq!(err.to_string(), "transport closed");
    }
}
