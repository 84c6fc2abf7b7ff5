//! Public RPC client for a native messaging host.

use std::sync::Arc;
use std::time::Duration;

use hostlink_protocol::Message;

use crate::config::{ClientConfig, ConfigError};
use crate::error::RpcError;
use crate::manager::ConnectionManager;
use crate::transport::Transport;
use crate::transport::native::NativeHostTransport;
use crate::types::{ClientEvent, ConnectionState, HealthSnapshot, ListenerId};

const NOT_CONNECTED_HINT: &str = "check that the native host is installed and that its manifest's \
     allowed_origins lists this extension";

/// Resilient request/response client for one native host.
///
/// Cheap to clone; every clone drives the same channel.
///
/// ```no_run
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// use hostlink_connection::{ClientConfig, RpcClient};
/// use hostlink_protocol::{Message, MessageType};
///
/// let client = RpcClient::native(ClientConfig::new("com.example.video_host"))?;
/// let locations = client
///     .send_message(Message::new(MessageType::GetDownloadLocations))
///     .await?;
/// println!("{}", serde_json::to_string(&locations)?);
/// client.disconnect();
/// # Ok(())
/// # }
/// ```
pub struct RpcClient<T: Transport> {
    manager: Arc<ConnectionManager<T>>,
}

impl<T: Transport> Clone for RpcClient<T> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

impl RpcClient<NativeHostTransport> {
    /// Creates a client that spawns the host through its native messaging
    /// manifest.
    pub fn native(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = NativeHostTransport::from_config(&config.transport);
        Ok(Self::new(config, transport))
    }
}

impl<T: Transport> RpcClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new(config, transport)),
        }
    }

    /// Connects to the host, returning whether the handshake succeeded.
    ///
    /// Stops any automatic reconnection in progress and resets its
    /// attempt budget.
    pub async fn connect(&self) -> bool {
        self.manager.connect_manual().await
    }

    /// Sends a request with the configured default timeout.
    pub async fn send_message(&self, msg: Message) -> Result<Message, RpcError> {
        let timeout = self.manager.config().request_timeout();
        self.send_message_with_timeout(msg, timeout).await
    }

    /// Sends a request, connecting first if needed, and waits for the
    /// response carrying the same id.
    ///
    /// Dropping the returned future abandons the request.
    pub async fn send_message_with_timeout(
        &self,
        msg: Message,
        timeout: Duration,
    ) -> Result<Message, RpcError> {
        if !self.manager.connect().await {
            let detail = match self.manager.last_error() {
                Some(e) => format!("{e}; {NOT_CONNECTED_HINT}"),
                None => NOT_CONNECTED_HINT.to_string(),
            };
            return Err(RpcError::NotConnected {
                host_id: self.manager.config().host_id.clone(),
                detail,
            });
        }
        self.manager.request(msg, timeout).await
    }

    /// Closes the channel without reconnecting. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.manager.disconnect();
    }

    /// Subscribes to an event by name: `connect`, `disconnect`,
    /// `reconnect`, `reconnect-failed`, `progress`, or a push message type.
    ///
    /// Lifecycle and push events share one namespace. A host push whose
    /// `type` is a lifecycle name reaches those listeners as
    /// [`ClientEvent::Push`], so match on the variant rather than the name.
    pub fn add_event_listener(
        &self,
        event: &str,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.manager.events().add_listener(event, callback)
    }

    pub fn remove_event_listener(&self, event: &str, id: &ListenerId) -> bool {
        self.manager.events().remove_listener(event, id)
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn health(&self) -> HealthSnapshot {
        self.manager.health()
    }

    pub fn pending_requests(&self) -> usize {
        self.manager.registry().len()
    }

    pub fn last_error(&self) -> Option<String> {
        self.manager.last_error()
    }

    pub fn config(&self) -> &ClientConfig {
        self.manager.config()
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<T>> {
        &self.manager
    }
}
