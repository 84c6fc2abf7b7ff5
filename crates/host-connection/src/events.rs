//! Publish/subscribe bus for client events.
//!
//! Listeners subscribe to an event name (see [`ClientEvent::name`]) and are
//! invoked in registration order. A panicking listener is logged and skipped;
//! it never prevents delivery to the others.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use tracing::{error, trace};

use crate::types::{ClientEvent, ListenerId};

/// Callback invoked for every event of the subscribed name.
pub type Listener = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

/// Event listener registry keyed by event name.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its id.
    pub fn add_listener(
        &self,
        event: &str,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId::new();
        self.lock()
            .entry(event.to_string())
            .or_default()
            .push((id.clone(), Arc::new(callback)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered for `event`.
    pub fn remove_listener(&self, event: &str, id: &ListenerId) -> bool {
        let mut map = self.lock();
        let Some(list) = map.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(event);
        }
        removed
    }

    /// Delivers an event to every listener registered for its name.
    ///
    /// Listeners run outside the registry lock, so they may add or remove
    /// listeners (or call back into the client) without deadlocking.
    pub fn trigger(&self, event: &ClientEvent) {
        let name = event.name();
        let snapshot: Vec<(ListenerId, Listener)> = match self.lock().get(name) {
            Some(list) => list.clone(),
            None => {
                trace!(event = name, "no listeners for event");
                return;
            }
        };

        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(event = name, listener = %id, "event listener panicked");
            }
        }
    }

    /// Returns the number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().get(event).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(ListenerId, Listener)>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}
