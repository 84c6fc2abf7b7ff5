//! Native messaging transport.
//!
//! Locates the host through its JSON manifest, spawns the host executable,
//! and exchanges length-prefixed JSON over the child's stdin/stdout, the
//! same way a browser does.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hostlink_protocol::NativeMessageCodec;

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::pumps::{read::read_pump, stderr::stderr_pump, write::write_pump};
use crate::transport::{Channel, Transport};

/// Only host type browsers support.
const STDIO_HOST_TYPE: &str = "stdio";

/// Native messaging host manifest (`<host_id>.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub host_type: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl HostManifest {
    /// Reads and validates a manifest for `host_id`.
    pub fn load(path: &Path, host_id: &str) -> Result<Self, TransportError> {
        let data = std::fs::read_to_string(path)?;
        let manifest: HostManifest =
            serde_json::from_str(&data).map_err(|e| TransportError::InvalidManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if manifest.name != host_id {
            return Err(TransportError::InvalidManifest {
                path: path.to_path_buf(),
                reason: format!("name {:?} does not match host {host_id:?}", manifest.name),
            });
        }
        if manifest.host_type != STDIO_HOST_TYPE {
            return Err(TransportError::InvalidManifest {
                path: path.to_path_buf(),
                reason: format!("unsupported host type {:?}", manifest.host_type),
            });
        }
        Ok(manifest)
    }

    /// Returns `true` if `origin` may talk to this host.
    pub fn allows(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }

    /// Resolves the executable path; relative paths are taken relative to
    /// the manifest's directory.
    pub fn executable(&self, manifest_path: &Path) -> PathBuf {
        if self.path.is_absolute() {
            return self.path.clone();
        }
        manifest_path
            .parent()
            .map(|dir| dir.join(&self.path))
            .unwrap_or_else(|| self.path.clone())
    }
}

/// Checks a host name against the browser's naming rules: dot-separated
/// segments of lowercase letters, digits and underscores.
pub fn validate_host_name(name: &str) -> Result<(), TransportError> {
    let valid = !name.is_empty()
        && name.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidHostName(name.to_string()))
    }
}

/// Returns the platform's default manifest directories, user-level first.
pub fn default_manifest_dirs() -> Vec<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        let config = PathBuf::from(home).join(".config");
        vec![
            config.join("google-chrome").join("NativeMessagingHosts"),
            config.join("chromium").join("NativeMessagingHosts"),
            PathBuf::from("/etc/opt/chrome/native-messaging-hosts"),
            PathBuf::from("/etc/chromium/native-messaging-hosts"),
        ]
    }

    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        let support = PathBuf::from(home).join("Library").join("Application Support");
        vec![
            support.join("Google").join("Chrome").join("NativeMessagingHosts"),
            support.join("Chromium").join("NativeMessagingHosts"),
            PathBuf::from("/Library/Google/Chrome/NativeMessagingHosts"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        // Windows registers hosts in the registry; manifests usually sit
        // next to the host, so only the per-user data dir is searched.
        let appdata = std::env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| "C:\\Users\\Default\\AppData\\Local".into());
        vec![PathBuf::from(appdata).join("hostlink").join("NativeMessagingHosts")]
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        vec![PathBuf::from("/tmp/hostlink/NativeMessagingHosts")]
    }
}

/// Transport that spawns native messaging hosts as child processes.
#[derive(Debug, Clone)]
pub struct NativeHostTransport {
    manifest_dirs: Vec<PathBuf>,
    origin: Option<String>,
    codec: NativeMessageCodec,
}

impl Default for NativeHostTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeHostTransport {
    /// Creates a transport searching the platform's default directories.
    pub fn new() -> Self {
        Self {
            manifest_dirs: default_manifest_dirs(),
            origin: None,
            codec: NativeMessageCodec::new(),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        let mut transport = Self::new();
        if !config.manifest_dirs.is_empty() {
            transport.manifest_dirs = config.manifest_dirs.clone();
        }
        transport.origin = config.origin.clone();
        transport
    }

    #[must_use]
    pub fn with_manifest_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.manifest_dirs = dirs;
        self
    }

    /// Sets the extension origin. It must appear in the manifest's
    /// `allowed_origins` and is passed to the host as its first argument.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Finds and validates the manifest for `host_id`.
    pub fn find_manifest(&self, host_id: &str) -> Result<(PathBuf, HostManifest), TransportError> {
        validate_host_name(host_id)?;
        let file_name = format!("{host_id}.json");
        for dir in &self.manifest_dirs {
            let path = dir.join(&file_name);
            if path.is_file() {
                debug!(host = %host_id, path = %path.display(), "found native host manifest");
                let manifest = HostManifest::load(&path, host_id)?;
                return Ok((path, manifest));
            }
        }
        Err(TransportError::ManifestNotFound {
            host: host_id.to_string(),
            searched: self
                .manifest_dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    fn spawn(&self, manifest_path: &Path, manifest: &HostManifest) -> Result<Child, TransportError> {
        let exe = manifest.executable(manifest_path);
        let mut cmd = Command::new(&exe);
        if let Some(origin) = &self.origin {
            cmd.arg(origin);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd.spawn()
            .map_err(|source| TransportError::Spawn { path: exe, source })
    }
}

impl Transport for NativeHostTransport {
    async fn open(&self, host_id: &str) -> Result<Channel, TransportError> {
        let (manifest_path, manifest) = self.find_manifest(host_id)?;

        if let Some(origin) = &self.origin
            && !manifest.allows(origin)
        {
            return Err(TransportError::OriginNotAllowed {
                origin: origin.clone(),
                path: manifest_path,
            });
        }

        let mut child = self.spawn(&manifest_path, &manifest)?;
        let pid = child.id();
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            return Err(TransportError::Closed);
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let closer = CancellationToken::new();

        tokio::spawn(write_pump(
            FramedWrite::new(stdin, self.codec.clone()),
            outbound_rx,
            closer.clone(),
        ));
        tokio::spawn(read_pump(
            FramedRead::new(stdout, self.codec.clone()),
            inbound_tx,
            closer.clone(),
        ));
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(stderr_pump(stderr, host_id.to_string()));
        }
        tokio::spawn(supervise(child, closer.clone(), host_id.to_string()));

        info!(host = %host_id, pid = ?pid, "native host started");
        Ok(Channel {
            outbound: outbound_tx,
            inbound: inbound_rx,
            closer,
        })
    }
}

/// Waits for the host to exit or for the channel to be cancelled, whichever
/// comes first, and makes sure both happen.
async fn supervise(mut child: Child, closer: CancellationToken, host: String) {
    tokio::select! {
        _ = closer.cancelled() => {
            if let Err(e) = child.start_kill() {
                debug!(host = %host, error = %e, "native host already gone");
            }
            match child.wait().await {
                Ok(status) => debug!(host = %host, %status, "native host stopped"),
                Err(e) => warn!(host = %host, error = %e, "failed to reap native host"),
            }
        }
        status = child.wait() => {
            match status {
                Ok(status) => info!(host = %host, %status, "native host exited"),
                Err(e) => warn!(host = %host, error = %e, "failed to wait for native host"),
            }
            closer.cancel();
        }
    }
}
