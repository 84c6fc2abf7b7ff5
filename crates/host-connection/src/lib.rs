//! Connection manager for native messaging hosts.
//!
//! Provides a resilient RPC client that opens a duplex channel to a
//! native host process, correlates requests with responses, dispatches
//! push events to listeners, and heals the channel through bounded
//! reconnection and periodic health checks.

pub mod client;
pub mod config;
mod dispatch;
pub mod error;
pub mod events;
pub(crate) mod health;
pub mod manager;
mod pumps;
pub(crate) mod reconnection;
pub mod registry;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::RpcClient;
pub use config::{ClientConfig, ConfigError, TransportConfig};
pub use error::{RpcError, TransportError};
pub use events::EventBus;
pub use manager::ConnectionManager;
pub use registry::RequestRegistry;
pub use transport::native::{HostManifest, NativeHostTransport};
pub use transport::{Channel, Transport};
pub use types::{ClientEvent, ConnectionState, HealthSnapshot, ListenerId};
