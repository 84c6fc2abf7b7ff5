//! Client configuration.
//!
//! Configuration is plain TOML with every key optional:
//!
//! ```toml
//! host_id = "com.example.video_host"
//! request_timeout_ms = 30000
//! max_reconnects = 5
//!
//! [transport]
//! origin = "chrome-extension://abcdefghijklmnop/"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hostlink_protocol::constants::{
    HANDSHAKE_TIMEOUT, HEALTH_CHECK_INTERVAL, HEALTH_CHECK_TIMEOUT, MAX_RECONNECTS,
    RECONNECT_DELAY, REQUEST_TIMEOUT, STALE_THRESHOLD,
};

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for an [`RpcClient`](crate::RpcClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name of the native host to connect to.
    pub host_id: String,
    pub handshake_timeout_ms: u64,
    /// Default deadline for `send_message`.
    pub request_timeout_ms: u64,
    /// Delay before the first reconnection attempt.
    pub reconnect_delay_ms: u64,
    pub max_reconnects: u32,
    /// Multiplier applied to the delay per attempt. `1.0` keeps it fixed.
    pub reconnect_backoff_factor: f64,
    /// Cap on the delay when backoff is enabled.
    pub reconnect_max_delay_ms: u64,
    pub health_check_interval_ms: u64,
    pub health_check_timeout_ms: u64,
    /// Age of the last successful message that forces a hard reset.
    pub stale_threshold_ms: u64,
    pub transport: TransportConfig,
}

/// Options for the native messaging transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Extension origin passed to the host and checked against its manifest.
    pub origin: Option<String>,
    /// Directories searched for `<host_id>.json`. Empty means the platform defaults.
    pub manifest_dirs: Vec<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host_id: String::new(),
            handshake_timeout_ms: HANDSHAKE_TIMEOUT.as_millis() as u64,
            request_timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
            reconnect_delay_ms: RECONNECT_DELAY.as_millis() as u64,
            max_reconnects: MAX_RECONNECTS,
            reconnect_backoff_factor: 1.0,
            reconnect_max_delay_ms: 30_000,
            health_check_interval_ms: HEALTH_CHECK_INTERVAL.as_millis() as u64,
            health_check_timeout_ms: HEALTH_CHECK_TIMEOUT.as_millis() as u64,
            stale_threshold_ms: STALE_THRESHOLD.as_millis() as u64,
            transport: TransportConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a default configuration for the given host.
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), host = %config.host_id, "configuration loaded");
        Ok(config)
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host_id.is_empty() {
            return Err(ConfigError::Invalid("host_id must not be empty".into()));
        }
        let timings = [
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("health_check_interval_ms", self.health_check_interval_ms),
            ("health_check_timeout_ms", self.health_check_timeout_ms),
            ("stale_threshold_ms", self.stale_threshold_ms),
        ];
        for (name, value) in timings {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        if self.reconnect_backoff_factor.is_nan() || self.reconnect_backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "reconnect_backoff_factor must be at least 1.0".into(),
            ));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }

    /// Calculates the delay before a reconnection attempt (1-based).
    ///
    /// With the default factor of `1.0` every attempt waits
    /// `reconnect_delay_ms`; larger factors grow the delay geometrically
    /// up to `reconnect_max_delay_ms`.
    pub fn reconnect_delay_for(&self, attempt: u32) -> Duration {
        let base = Duration::from_millis(self.reconnect_delay_ms);
        if self.reconnect_backoff_factor <= 1.0 {
            return base;
        }
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = base.as_secs_f64() * self.reconnect_backoff_factor.powi(exp);
        let cap = Duration::from_millis(self.reconnect_max_delay_ms.max(self.reconnect_delay_ms));
        Duration::from_secs_f64(secs.min(cap.as_secs_f64()))
    }
}
