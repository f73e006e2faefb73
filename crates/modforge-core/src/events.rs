//! Host event bus.
//!
//! Mods subscribe to named events through their context; the host publishes.
//! Handlers are called synchronously on the publishing thread.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

/// An event published by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Identifier returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    owner: String,
    event: String,
    handler: EventHandler,
}

#[derive(Default)]
struct BusState {
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    next_id: u64,
}

/// Synchronous publish/subscribe bus.
#[derive(Default)]
pub struct EventBus {
    state: RwLock<BusState>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `handler` for every event named `event`.
    pub fn subscribe(&self, owner: &str, event: &str, handler: EventHandler) -> SubscriptionId {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.subscriptions.insert(
            id,
            Subscription {
                owner: owner.to_string(),
                event: event.to_string(),
                handler,
            },
        );
        trace!(mod_id = %owner, event, "Subscribed {}", id);
        id
    }

    /// Deliver `event` to its subscribers in subscription order.
    ///
    /// Returns the number of handlers called.
    pub fn publish(&self, event: &Event) -> usize {
        // handlers may subscribe or unsubscribe, so call them unlocked
        let handlers: Vec<EventHandler> = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscriptions
            .values()
            .filter(|s| s.event == event.name)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .subscriptions
            .remove(&id)
            .is_some()
    }

    /// Drop every subscription held by `owner`. Returns how many were dropped.
    pub fn unsubscribe_all(&self, owner: &str) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let before = state.subscriptions.len();
        state.subscriptions.retain(|_, s| s.owner != owner);
        before - state.subscriptions.len()
    }

    /// Number of subscriptions held by `owner`.
    pub fn subscriptions_of(&self, owner: &str) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscriptions
            .values()
            .filter(|s| s.owner == owner)
            .count()
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscriptions
            .values()
            .filter(|s| s.event == event)
            .count()
    }
}
