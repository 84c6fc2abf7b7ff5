//! In-memory native host used by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hostlink_protocol::{Message, MessageType};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::manager::lock;
use crate::transport::{Channel, Transport};

pub(crate) const TEST_HOST: &str = "com.example.hostlink_test";

pub(crate) fn test_config() -> ClientConfig {
    ClientConfig::new(TEST_HOST)
}

/// How the fake host answers `ping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PingReply {
    /// `{type:"pong", nativeHostConnected:true}`
    Connected,
    /// `{type:"pong", nativeHostConnected:false}`
    NotConnected,
    /// `{id, result:"ok"}` like any other request.
    Echo,
    Silent,
}

#[derive(Debug, Clone)]
struct Behavior {
    ping: PingReply,
    answer_health: bool,
    legacy_health: bool,
    echo: bool,
    reply_delay: Duration,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            ping: PingReply::Connected,
            answer_health: true,
            legacy_health: false,
            echo: true,
            reply_delay: Duration::ZERO,
        }
    }
}

struct Session {
    push: mpsc::Sender<Message>,
    kill: CancellationToken,
}

#[derive(Default)]
struct MockState {
    opens: AtomicUsize,
    fail_open: AtomicBool,
    open_delay: Mutex<Duration>,
    behavior: Mutex<Behavior>,
    sessions: Mutex<Vec<Session>>,
    received: Mutex<Vec<Message>>,
}

/// Transport whose "host" is a task answering from a scripted behavior.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn set_fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_open_delay(&self, delay: Duration) {
        *lock(&self.state.open_delay) = delay;
    }

    pub(crate) fn set_ping_reply(&self, reply: PingReply) {
        lock(&self.state.behavior).ping = reply;
    }

    pub(crate) fn set_answer_health(&self, answer: bool) {
        lock(&self.state.behavior).answer_health = answer;
    }

    pub(crate) fn set_legacy_health(&self, legacy: bool) {
        lock(&self.state.behavior).legacy_health = legacy;
    }

    pub(crate) fn set_echo(&self, echo: bool) {
        lock(&self.state.behavior).echo = echo;
    }

    pub(crate) fn set_reply_delay(&self, delay: Duration) {
        lock(&self.state.behavior).reply_delay = delay;
    }

    /// Every message the host has read, across all sessions.
    pub(crate) fn received(&self) -> Vec<Message> {
        lock(&self.state.received).clone()
    }

    pub(crate) fn received_of(&self, msg_type: &MessageType) -> usize {
        lock(&self.state.received)
            .iter()
            .filter(|m| m.is_type(msg_type))
            .count()
    }

    /// Sends an unsolicited message on the newest session.
    pub(crate) async fn push(&self, msg: Message) {
        let push = lock(&self.state.sessions).last().map(|s| s.push.clone());
        if let Some(push) = push {
            let _ = push.send(msg).await;
        }
    }

    /// Makes the host of the newest session exit.
    pub(crate) fn close_current(&self) {
        if let Some(session) = lock(&self.state.sessions).last() {
            session.kill.cancel();
        }
    }
}

impl Transport for MockTransport {
    async fn open(&self, host_id: &str) -> Result<Channel, TransportError> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.state.open_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::ManifestNotFound {
                host: host_id.to_string(),
                searched: "<mock>".into(),
            });
        }

        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        let (push_tx, push_rx) = mpsc::channel(64);
        let closer = CancellationToken::new();
        let kill = CancellationToken::new();

        lock(&self.state.sessions).push(Session {
            push: push_tx,
            kill: kill.clone(),
        });
        tokio::spawn(run_host(
            self.state.clone(),
            out_rx,
            push_rx,
            in_tx,
            closer.clone(),
            kill,
        ));

        Ok(Channel {
            outbound: out_tx,
            inbound: in_rx,
            closer,
        })
    }
}

async fn run_host(
    state: Arc<MockState>,
    mut requests: mpsc::Receiver<Message>,
    mut pushes: mpsc::Receiver<Message>,
    replies: mpsc::Sender<Message>,
    closer: CancellationToken,
    kill: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = closer.cancelled() => break,
            _ = kill.cancelled() => break,
            Some(msg) = pushes.recv() => {
                if replies.send(msg).await.is_err() {
                    break;
                }
            }
            msg = requests.recv() => {
                let Some(msg) = msg else { break };
                lock(&state.received).push(msg.clone());
                let behavior = lock(&state.behavior).clone();
                let Some(reply) = reply_for(&behavior, &msg) else { continue };
                if !behavior.reply_delay.is_zero() {
                    tokio::time::sleep(behavior.reply_delay).await;
                }
                if replies.send(reply).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn reply_for(behavior: &Behavior, msg: &Message) -> Option<Message> {
    let echo = || msg.reply().with_field("result", "ok");
    match &msg.msg_type {
        Some(MessageType::Ping) => match behavior.ping {
            PingReply::Connected => Some(
                msg.reply()
                    .with_type(MessageType::Pong)
                    .with_field("nativeHostConnected", true),
            ),
            PingReply::NotConnected => Some(
                msg.reply()
                    .with_type(MessageType::Pong)
                    .with_field("nativeHostConnected", false),
            ),
            PingReply::Echo => Some(echo()),
            PingReply::Silent => None,
        },
        Some(MessageType::HealthCheck) if behavior.answer_health => Some(if behavior.legacy_health {
            msg.reply()
                .with_type(MessageType::Pong)
                .with_field("nativeHostConnected", true)
        } else {
            msg.reply().with_field("status", "ok")
        }),
        Some(MessageType::HealthCheck) => None,
        _ if msg.field("fail").is_some() => Some(msg.reply_error("requested failure")),
        _ if behavior.echo => Some(echo()),
        _ => None,
    }
}
