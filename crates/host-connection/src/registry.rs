//! Pending request registry.
//!
//! Maps a correlation id to the caller waiting on it. Every entry leaves
//! the registry exactly once: through a matching response, its timeout,
//! an explicit cancel, or a bulk rejection when the channel closes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use hostlink_protocol::Message;

use crate::error::RpcError;

/// Outcome delivered to the caller of a request.
pub type Completion = Result<Message, RpcError>;

/// Process-wide counter so ids stay unique across client instances.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a fresh correlation id: a monotonic counter plus the current
/// Unix time in milliseconds.
pub fn next_request_id() -> String {
    let n = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    format!("msg_{n}_{}", chrono::Utc::now().timestamp_millis())
}

struct PendingRequest {
    tx: oneshot::Sender<Completion>,
    created_at: Instant,
    timeout: AbortHandle,
}

type PendingMap = HashMap<String, PendingRequest>;

/// Registry of requests awaiting a response.
#[derive(Clone, Default)]
pub struct RequestRegistry {
    pending: Arc<Mutex<PendingMap>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request and arms its timeout.
    ///
    /// When the timer fires the entry is removed and the caller receives
    /// [`RpcError::Timeout`]. Must be called from within a tokio runtime.
    pub fn register(
        &self,
        id: &str,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Completion>, RpcError> {
        let mut map = self.lock();
        if map.contains_key(id) {
            return Err(RpcError::DuplicateId(id.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        let timer = {
            let pending = Arc::downgrade(&self.pending);
            let id = id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                expire(&pending, &id, timeout);
            })
        };

        map.insert(
            id.to_string(),
            PendingRequest {
                tx,
                created_at: Instant::now(),
                timeout: timer.abort_handle(),
            },
        );
        trace!(id, pending = map.len(), "request registered");
        Ok(rx)
    }

    /// Completes the request matching `msg.id`.
    ///
    /// Responses carrying an `error` reject the request with
    /// [`RpcError::Host`]. Returns the message back if no request matches.
    pub fn complete(&self, msg: Message) -> Result<(), Message> {
        let Some(id) = msg.id.clone() else {
            return Err(msg);
        };
        let Some(entry) = self.lock().remove(&id) else {
            return Err(msg);
        };
        entry.timeout.abort();

        trace!(
            id = %id,
            elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
            "request completed"
        );
        let outcome = match msg.error_message() {
            Some(message) => Err(RpcError::Host { id, message }),
            None => Ok(msg),
        };
        let _ = entry.tx.send(outcome);
        Ok(())
    }

    /// Drops a request without notifying its caller.
    ///
    /// Used when the caller itself gave up waiting.
    pub fn cancel(&self, id: &str) -> bool {
        match self.lock().remove(id) {
            Some(entry) => {
                entry.timeout.abort();
                true
            }
            None => false,
        }
    }

    /// Rejects every pending request with [`RpcError::Disconnected`] and
    /// empties the registry. Returns how many were rejected.
    pub fn reject_all(&self, reason: &str) -> usize {
        let drained: Vec<(String, PendingRequest)> = self.lock().drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            entry.timeout.abort();
            trace!(id = %id, reason, "request rejected");
            let _ = entry.tx.send(Err(RpcError::Disconnected(reason.to_string())));
        }
        if count > 0 {
            debug!(count, reason, "rejected pending requests");
        }
        count
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Timer body: removes the entry and rejects it with a timeout.
fn expire(pending: &Weak<Mutex<PendingMap>>, id: &str, after: Duration) {
    let Some(pending) = pending.upgrade() else {
        return;
    };
    let entry = pending.lock().unwrap_or_else(|e| e.into_inner()).remove(id);
    if let Some(entry) = entry {
        debug!(id, after_ms = after.as_millis() as u64, "request timed out");
        let _ = entry.tx.send(Err(RpcError::Timeout {
            id: id.to_string(),
            after,
        }));
    }
}

/// Removes a request from the registry when dropped.
///
/// Held by the caller while it awaits the response, so a caller that stops
/// waiting never leaves its entry behind.
pub(crate) struct PendingGuard<'a> {
    registry: &'a RequestRegistry,
    id: &'a str,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(registry: &'a RequestRegistry, id: &'a str) -> Self {
        Self { registry, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.cancel(self.id);
    }
}
