//! Connection manager for a native host channel.
//!
//! Owns the channel, the connection state and the request registry. Opens
//! channels through a [`Transport`], performs the ping/pong handshake,
//! coalesces concurrent connects into a single attempt, and tears the
//! channel down on request, on unsolicited close, or when health checks
//! find it stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use hostlink_protocol::{HealthCheckResponse, Message, MessageType, PongResponse};

use crate::config::ClientConfig;
use crate::error::RpcError;
use crate::events::EventBus;
use crate::registry::{PendingGuard, RequestRegistry, next_request_id};
use crate::transport::{Channel, Transport};
use crate::types::{ClientEvent, ConnectionState, HealthSnapshot};
use crate::{dispatch, health, reconnection};

pub(crate) const DISCONNECTED_INTENTIONALLY: &str = "disconnected intentionally";
pub(crate) const DISCONNECTED_BY_HOST: &str = "native host disconnected";
const CHANNEL_STALE: &str = "native host stopped responding";
const HANDSHAKE_ABORTED: &str = "channel closed during handshake";

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// The channel currently installed, tagged with the generation that
/// opened it so stale close notifications can be told apart.
struct ActiveChannel {
    generation: u64,
    outbound: mpsc::Sender<Message>,
    closer: CancellationToken,
}

struct Link {
    state: ConnectionState,
    channel: Option<ActiveChannel>,
}

pub(crate) struct Health {
    last_success: Option<Instant>,
    last_success_at: Option<DateTime<Utc>>,
    pub(crate) reconnect_attempts: u32,
}

impl Health {
    fn touch(&mut self) {
        self.last_success = Some(Instant::now());
        self.last_success_at = Some(Utc::now());
    }
}

type ConnectFuture = Shared<BoxFuture<'static, bool>>;

/// A connect attempt and the epoch it was started in.
struct InFlight {
    epoch: u64,
    attempt: ConnectFuture,
}

/// Orchestrates the lifecycle of the channel to one native host.
pub struct ConnectionManager<T> {
    pub(crate) config: ClientConfig,
    transport: T,
    link: Mutex<Link>,
    pub(crate) registry: RequestRegistry,
    pub(crate) events: EventBus,
    pub(crate) health: Mutex<Health>,
    /// The connect attempt in progress, shared by every concurrent caller.
    in_flight: Mutex<Option<InFlight>>,
    pub(crate) health_task: Mutex<Option<CancellationToken>>,
    pub(crate) reconnect_task: Mutex<Option<CancellationToken>>,
    /// Bumped by `disconnect`, under the reconnect slot and link locks, so
    /// attempts and reconnects started earlier give up.
    epoch: AtomicU64,
    generation: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            link: Mutex::new(Link {
                state: ConnectionState::Disconnected,
                channel: None,
            }),
            registry: RequestRegistry::new(),
            events: EventBus::new(),
            health: Mutex::new(Health {
                last_success: None,
                last_success_at: None,
                reconnect_attempts: 0,
            }),
            in_flight: Mutex::new(None),
            health_task: Mutex::new(None),
            reconnect_task: Mutex::new(None),
            epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.link).state
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Text of the most recent failed connect attempt.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        lock(&self.health).reconnect_attempts
    }

    pub(crate) fn last_success_age(&self) -> Option<Duration> {
        lock(&self.health).last_success.map(|t| t.elapsed())
    }

    pub fn health(&self) -> HealthSnapshot {
        let state = self.state();
        let h = lock(&self.health);
        HealthSnapshot {
            state,
            reconnect_attempts: h.reconnect_attempts,
            last_success_at: h.last_success_at,
            last_success_age: h.last_success.map(|t| t.elapsed()),
            pending_requests: self.registry.len(),
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Ensures the channel is connected.
    ///
    /// Returns immediately when already connected. Otherwise joins the
    /// attempt in progress or starts one; only one channel is ever opened
    /// at a time no matter how many callers race here.
    pub async fn connect(self: &Arc<Self>) -> bool {
        self.connect_at(self.epoch()).await
    }

    /// Connects unless `disconnect` has run since `epoch` was observed.
    pub(crate) async fn connect_at(self: &Arc<Self>, epoch: u64) -> bool {
        let attempt = {
            let mut slot = lock(&self.in_flight);
            if self.state() == ConnectionState::Connected {
                return true;
            }
            if self.epoch() != epoch {
                trace!("connect superseded by disconnect");
                return false;
            }
            match slot.as_ref() {
                Some(in_flight) if in_flight.epoch == epoch => {
                    trace!("joining connect attempt in progress");
                    in_flight.attempt.clone()
                }
                _ => {
                    let mgr = Arc::clone(self);
                    let handle = tokio::spawn(async move { mgr.attempt(epoch).await });
                    let attempt = async move { handle.await.unwrap_or(false) }
                        .boxed()
                        .shared();
                    *slot = Some(InFlight {
                        epoch,
                        attempt: attempt.clone(),
                    });
                    attempt
                }
            }
        };
        attempt.await
    }

    /// Connect requested by the caller: stops any automatic reconnect loop
    /// and resets the attempt budget before connecting.
    pub async fn connect_manual(self: &Arc<Self>) -> bool {
        reconnection::cancel(self);
        lock(&self.health).reconnect_attempts = 0;
        self.connect().await
    }

    async fn attempt(self: Arc<Self>, epoch: u64) -> bool {
        let current = {
            let mut link = lock(&self.link);
            let current = self.epoch() == epoch;
            if current && link.channel.is_none() {
                link.state = ConnectionState::Connecting;
            }
            current
        };

        let connected = if current {
            debug!(host = %self.config.host_id, "connecting to native host");
            match self.open_and_handshake(epoch).await {
                Ok(generation) => self.mark_connected(epoch, generation),
                Err(e) => {
                    warn!(host = %self.config.host_id, error = %e, "failed to connect to native host");
                    self.fail_attempt(epoch, e.to_string());
                    false
                }
            }
        } else {
            false
        };

        let mut slot = lock(&self.in_flight);
        if slot.as_ref().is_some_and(|f| f.epoch == epoch) {
            *slot = None;
        }
        connected
    }

    async fn open_and_handshake(self: &Arc<Self>, epoch: u64) -> Result<u64, RpcError> {
        let Channel {
            outbound,
            inbound,
            closer,
        } = self.transport.open(&self.config.host_id).await?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut link = lock(&self.link);
            if self.epoch.load(Ordering::SeqCst) != epoch {
                closer.cancel();
                return Err(RpcError::Disconnected(DISCONNECTED_INTENTIONALLY.into()));
            }
            link.channel = Some(ActiveChannel {
                generation,
                outbound,
                closer: closer.clone(),
            });
        }
        tokio::spawn(dispatch::read_loop(
            Arc::downgrade(self),
            inbound,
            closer,
            generation,
        ));

        if let Err(e) = self.handshake().await {
            self.drop_channel(generation);
            return Err(match e {
                RpcError::Handshake(_) => e,
                other => RpcError::Handshake(other.to_string()),
            });
        }
        Ok(generation)
    }

    async fn handshake(&self) -> Result<(), RpcError> {
        let resp = self
            .request(
                Message::new(MessageType::Ping),
                self.config.handshake_timeout(),
            )
            .await?;
        let pong: PongResponse = resp
            .parse_payload()
            .map_err(|e| RpcError::Handshake(format!("malformed pong: {e}")))?;

        if resp.is_type(&MessageType::Pong) && pong.native_host_connected {
            trace!(version = ?pong.version, "handshake complete");
            Ok(())
        } else {
            Err(RpcError::Handshake(
                "native host answered ping without confirming the connection".into(),
            ))
        }
    }

    fn mark_connected(self: &Arc<Self>, epoch: u64, generation: u64) -> bool {
        {
            let mut link = lock(&self.link);
            if link.channel.as_ref().map(|c| c.generation) != Some(generation) {
                drop(link);
                self.fail_attempt(epoch, HANDSHAKE_ABORTED.into());
                return false;
            }
            link.state = ConnectionState::Connected;
        }
        {
            let mut h = lock(&self.health);
            h.reconnect_attempts = 0;
            h.touch();
        }
        *lock(&self.last_error) = None;
        health::start(self);

        info!(host = %self.config.host_id, "connected to native host");
        self.events.trigger(&ClientEvent::Connect);
        true
    }

    fn fail_attempt(&self, epoch: u64, error: String) {
        *lock(&self.last_error) = Some(error);
        let mut link = lock(&self.link);
        if link.channel.is_none() && self.epoch() == epoch {
            link.state = ConnectionState::Disconnected;
        }
    }

    /// Closes the channel opened by `generation` if it is still installed.
    fn drop_channel(&self, generation: u64) {
        let channel = {
            let mut link = lock(&self.link);
            if link.channel.as_ref().map(|c| c.generation) != Some(generation) {
                return;
            }
            link.state = ConnectionState::Disconnected;
            link.channel.take()
        };
        if let Some(channel) = channel {
            channel.closer.cancel();
        }
        self.registry.reject_all(HANDSHAKE_ABORTED);
    }

    /// Sends a request on the current channel and waits for its response.
    ///
    /// Does not try to connect. Assigns a correlation id when the message
    /// has none.
    pub async fn request(&self, mut msg: Message, timeout: Duration) -> Result<Message, RpcError> {
        let outbound = lock(&self.link)
            .channel
            .as_ref()
            .map(|c| c.outbound.clone())
            .ok_or_else(|| RpcError::Disconnected("no open channel".into()))?;

        let id = match &msg.id {
            Some(id) => id.clone(),
            None => {
                let id = next_request_id();
                msg.id = Some(id.clone());
                id
            }
        };

        let rx = self.registry.register(&id, timeout)?;
        let _guard = PendingGuard::new(&self.registry, &id);

        trace!(id = %id, msg_type = ?msg.msg_type, "sending request");
        if outbound.send(msg).await.is_err() {
            return Err(RpcError::Disconnected(
                "channel closed before the request was sent".into(),
            ));
        }

        let outcome = rx
            .await
            .unwrap_or_else(|_| Err(RpcError::Disconnected("request abandoned".into())));
        if matches!(outcome, Ok(_) | Err(RpcError::Host { .. })) {
            lock(&self.health).touch();
        }
        outcome
    }

    /// Sends one `healthCheck` probe.
    pub(crate) async fn probe(&self) -> Result<(), RpcError> {
        let resp = self
            .request(
                Message::new(MessageType::HealthCheck),
                self.config.health_check_timeout(),
            )
            .await?;
        let status: HealthCheckResponse = resp.parse_payload()?;
        if status.is_ok() || resp.is_type(&MessageType::Pong) {
            Ok(())
        } else {
            Err(RpcError::UnexpectedResponse(format!(
                "health check answered with status {:?}",
                status.status
            )))
        }
    }

    /// Handles the end of a channel's inbound stream.
    ///
    /// Ignored unless `generation` is still the installed channel, so
    /// channels closed on purpose never trigger this path.
    pub(crate) fn handle_close(self: &Arc<Self>, generation: u64) {
        let (previous, epoch) = {
            let mut link = lock(&self.link);
            if link.channel.as_ref().map(|c| c.generation) != Some(generation) {
                return;
            }
            link.channel = None;
            let previous = std::mem::replace(&mut link.state, ConnectionState::Disconnected);
            (previous, self.epoch())
        };
        health::stop(self);
        let rejected = self.registry.reject_all(DISCONNECTED_BY_HOST);

        if previous != ConnectionState::Connected {
            debug!(host = %self.config.host_id, "native host closed the channel during handshake");
            return;
        }

        warn!(host = %self.config.host_id, rejected, "native host disconnected unexpectedly");
        self.events
            .trigger(&ClientEvent::Disconnect { intentional: false });
        reconnection::schedule(self, epoch);
    }

    /// Closes the channel on the caller's request. Never reconnects.
    ///
    /// Emits `disconnect` only when a connected channel was closed; calling
    /// it again, or while nothing is connected, is a no-op.
    pub fn disconnect(&self) {
        let (channel, previous) = {
            let mut reconnect = lock(&self.reconnect_task);
            let mut link = lock(&self.link);
            self.epoch.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = reconnect.take() {
                token.cancel();
            }
            let previous = std::mem::replace(&mut link.state, ConnectionState::Disconnected);
            (link.channel.take(), previous)
        };
        health::stop(self);
        let rejected = self.registry.reject_all(DISCONNECTED_INTENTIONALLY);
        if let Some(channel) = &channel {
            channel.closer.cancel();
        }

        if previous != ConnectionState::Connected {
            debug!(host = %self.config.host_id, ?previous, "disconnect requested while not connected");
            return;
        }

        info!(host = %self.config.host_id, rejected, "disconnected from native host");
        self.events
            .trigger(&ClientEvent::Disconnect { intentional: true });
    }

    /// Drops a channel that stopped answering and connects again at once.
    pub(crate) fn hard_reset(self: &Arc<Self>) {
        let (channel, epoch) = {
            let mut link = lock(&self.link);
            let Some(channel) = link.channel.take() else {
                return;
            };
            link.state = ConnectionState::Disconnected;
            (channel, self.epoch())
        };
        health::stop(self);
        channel.closer.cancel();
        let rejected = self.registry.reject_all(CHANNEL_STALE);
        lock(&self.health).reconnect_attempts = 0;

        warn!(host = %self.config.host_id, rejected, "native host channel is stale, resetting");
        self.events
            .trigger(&ClientEvent::Disconnect { intentional: false });

        let mgr = Arc::clone(self);
        tokio::spawn(async move {
            if !mgr.connect_at(epoch).await {
                reconnection::schedule(&mgr, epoch);
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn current_generation(&self) -> Option<u64> {
        lock(&self.link).channel.as_ref().map(|c| c.generation)
    }
}

impl<T> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        for slot in [&self.health_task, &self.reconnect_task] {
            if let Some(token) = lock(slot).take() {
                token.cancel();
            }
        }
        if let Some(channel) = lock(&self.link).channel.take() {
            channel.closer.cancel();
        }
        self.registry.reject_all(DISCONNECTED_INTENTIONALLY);
    }
}
