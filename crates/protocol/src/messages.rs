use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Connection payloads
// ---------------------------------------------------------------------------

/// Host's answer to the `ping` handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongResponse {
    #[serde(default)]
    pub native_host_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Host's answer to a `healthCheck` probe.
///
/// Current hosts answer `{status: "ok"}`; older ones answer with the
/// handshake form `{type: "pong"}` and no status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl HealthCheckResponse {
    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some("ok")
    }
}

// ---------------------------------------------------------------------------
// Push events
// ---------------------------------------------------------------------------

/// Download progress pushed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub download_id: String,
    /// Percentage in `0.0..=100.0`.
    pub progress: f64,
    /// Transfer rate in bytes per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Estimated seconds remaining.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<f64>,
    /// Host's confidence in the estimate, `0.0..=1.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pong_uses_camel_case() {
        let pong: PongResponse =
            serde_json::from_str(r#"{"type":"pong","id":"h1","nativeHostConnected":true}"#)
                .unwrap();
        assert!(pong.native_host_connected);
        assert!(pong.version.is_none());
    }

    #[test]
    fn pong_defaults_to_not_connected() {
        let pong: PongResponse = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(!pong.native_host_connected);
    }

    #[test]
    fn health_check_status() {
        let ok: HealthCheckResponse = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert!(ok.is_ok());

        let legacy: HealthCheckResponse = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(!legacy.is_ok());
        assert!(legacy.status.is_none());
    }

    #[test]
    fn progress_omits_missing_optionals() {
        let ev = ProgressEvent {
            download_id: "d1".into(),
            progress: 10.0,
            speed: None,
            eta: Some(30.0),
            confidence: None,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("downloadId"));
        assert!(json.contains("eta"));
        assert!(!json.contains("speed"));
        assert!(!json.contains("confidence"));
    }
}
