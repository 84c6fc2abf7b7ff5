//! Bounded automatic reconnection after an unsolicited close.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manager::{ConnectionManager, lock};
use crate::transport::Transport;
use crate::types::{ClientEvent, ConnectionState};

/// Starts the reconnect loop unless one is already running or `disconnect`
/// has run since `epoch` was observed.
pub(crate) fn schedule<T: Transport>(manager: &Arc<ConnectionManager<T>>, epoch: u64) {
    let token = {
        let mut slot = lock(&manager.reconnect_task);
        if manager.epoch() != epoch {
            debug!(host = %manager.config.host_id, "reconnect superseded by disconnect");
            return;
        }
        if slot.as_ref().is_some_and(|t| !t.is_cancelled()) {
            debug!(host = %manager.config.host_id, "reconnect already in progress");
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        token
    };
    tokio::spawn(reconnect_loop(Arc::clone(manager), token, epoch));
}

/// Stops the reconnect loop, if any.
pub(crate) fn cancel<T>(manager: &ConnectionManager<T>) {
    if let Some(token) = lock(&manager.reconnect_task).take() {
        token.cancel();
    }
}

/// Holds the reconnect slot until the channel is back or the budget is
/// spent.
///
/// A close that lands while the slot is held is not rescheduled by
/// [`schedule`], so the state is checked again under the slot lock before
/// letting go of it.
async fn reconnect_loop<T: Transport>(
    manager: Arc<ConnectionManager<T>>,
    cancel: CancellationToken,
    epoch: u64,
) {
    loop {
        let restored = retry(&manager, &cancel, epoch).await;

        let mut slot = lock(&manager.reconnect_task);
        if cancel.is_cancelled() {
            return;
        }
        if restored && manager.state() != ConnectionState::Connected {
            debug!(host = %manager.config.host_id, "channel closed again right after reconnecting");
            continue;
        }
        cancel.cancel();
        if slot.as_ref().is_some_and(CancellationToken::is_cancelled) {
            *slot = None;
        }
        return;
    }
}

/// Retries `connect()` until it succeeds or the attempt budget runs out.
///
/// The attempt counter lives on the manager and is only reset by a
/// successful connect, a manual connect, or a stale-channel reset, so
/// `reconnect-failed` fires once per exhaustion. Returns whether a connect
/// succeeded.
async fn retry<T: Transport>(
    manager: &Arc<ConnectionManager<T>>,
    cancel: &CancellationToken,
    epoch: u64,
) -> bool {
    let max = manager.config.max_reconnects;

    loop {
        let attempt = {
            let mut h = lock(&manager.health);
            if h.reconnect_attempts >= max {
                None
            } else {
                h.reconnect_attempts += 1;
                Some(h.reconnect_attempts)
            }
        };
        let Some(attempt) = attempt else {
            let attempts = manager.reconnect_attempts();
            warn!(host = %manager.config.host_id, attempts, "giving up on reconnecting to native host");
            manager
                .events
                .trigger(&ClientEvent::ReconnectFailed { attempts });
            return false;
        };

        let delay = manager.config.reconnect_delay_for(attempt);
        info!(
            host = %manager.config.host_id,
            attempt,
            max,
            delay_ms = delay.as_millis() as u64,
            "reconnecting to native host"
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reconnect cancelled");
                return false;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if manager.state() == ConnectionState::Connected {
            debug!("connection restored elsewhere, stopping reconnect");
            return true;
        }

        let connected = manager.connect_at(epoch).await;
        if cancel.is_cancelled() {
            return false;
        }
        if connected {
            if manager.state() == ConnectionState::Connected {
                info!(host = %manager.config.host_id, attempt, "reconnected to native host");
                manager
                    .events
                    .trigger(&ClientEvent::Reconnect { attempts: attempt });
            }
            return true;
        }
        warn!(host = %manager.config.host_id, attempt, "reconnect attempt failed");
    }
}
