//! Periodic health checks while connected.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::manager::{ConnectionManager, lock};
use crate::transport::Transport;
use crate::types::ConnectionState;

/// Starts the health loop, replacing any loop already running.
pub(crate) fn start<T: Transport>(manager: &Arc<ConnectionManager<T>>) {
    let token = CancellationToken::new();
    if let Some(previous) = lock(&manager.health_task).replace(token.clone()) {
        previous.cancel();
    }
    tokio::spawn(health_loop(
        Arc::downgrade(manager),
        manager.config.health_check_interval(),
        token,
    ));
}

pub(crate) fn stop<T>(manager: &ConnectionManager<T>) {
    if let Some(token) = lock(&manager.health_task).take() {
        token.cancel();
    }
}

/// Probes the host every `period`.
///
/// A failed probe is tolerated while the last successful exchange is
/// younger than the stale threshold; past it the channel is reset.
async fn health_loop<T: Transport>(
    manager: Weak<ConnectionManager<T>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(mgr) = manager.upgrade() else { break };
                if mgr.state() != ConnectionState::Connected {
                    continue;
                }

                let result = mgr.probe().await;
                if cancel.is_cancelled() {
                    break;
                }
                let Err(e) = result else {
                    debug!(host = %mgr.config.host_id, "health check ok");
                    continue;
                };

                let age = mgr.last_success_age();
                let stale = age.is_none_or(|age| age > mgr.config.stale_threshold());
                if stale {
                    warn!(
                        host = %mgr.config.host_id,
                        error = %e,
                        age_ms = age.map(|a| a.as_millis() as u64),
                        "health check failed on a stale channel"
                    );
                    mgr.hard_reset();
                    break;
                }
                warn!(
                    host = %mgr.config.host_id,
                    error = %e,
                    "health check failed, channel still within stale threshold"
                );
            }
        }
    }
    debug!("health loop stopped");
}
