//! Routing of inbound messages to pending requests and event listeners.

use std::sync::Weak;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use hostlink_protocol::{Message, MessageType};

use crate::events::EventBus;
use crate::manager::ConnectionManager;
use crate::registry::RequestRegistry;
use crate::transport::Transport;
use crate::types::ClientEvent;

/// Where an inbound message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Response,
    Progress,
    Push,
    Dropped,
}

/// Routes one inbound message.
///
/// A message whose id matches a pending request completes that request
/// and goes nowhere else, even if it also carries a type.
pub(crate) fn route_inbound(registry: &RequestRegistry, events: &EventBus, msg: Message) -> Route {
    let msg = match registry.complete(msg) {
        Ok(()) => return Route::Response,
        Err(msg) => msg,
    };

    match &msg.msg_type {
        Some(MessageType::Progress) => {
            events.trigger(&ClientEvent::Progress(msg));
            Route::Progress
        }
        Some(msg_type) => {
            trace!(msg_type = %msg_type, "push message from native host");
            events.trigger(&ClientEvent::Push(msg));
            Route::Push
        }
        None => {
            debug!(id = ?msg.id, "dropping message with no matching request");
            Route::Dropped
        }
    }
}

/// Reads one channel until it ends, then reports the close.
///
/// Holds only a weak reference so a dropped client does not keep the
/// loop alive.
pub(crate) async fn read_loop<T: Transport>(
    manager: Weak<ConnectionManager<T>>,
    mut inbound: mpsc::Receiver<Message>,
    closer: CancellationToken,
    generation: u64,
) {
    loop {
        tokio::select! {
            _ = closer.cancelled() => break,
            msg = inbound.recv() => {
                let Some(msg) = msg else { break };
                let Some(mgr) = manager.upgrade() else { return };
                route_inbound(&mgr.registry, &mgr.events, msg);
            }
        }
    }

    trace!(generation, "inbound stream ended");
    if let Some(mgr) = manager.upgrade() {
        mgr.handle_close(generation);
    }
}
