//! Keyed publish/subscribe bus for external workflow events.
//!
//! Built on a `DashMap` of callbacks keyed by subscription id. Event-wait nodes
//! register one callback per invocation and remove it once their event has
//! arrived. Emitting with no subscribers is a no-op.

use std::sync::Arc;

use chainflow_types::event::WorkflowEvent;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use uuid::Uuid;

/// Callback invoked for every emitted event.
pub type EventCallback = Box<dyn Fn(&WorkflowEvent) + Send + Sync>;

/// Multi-subscriber event bus.
///
/// Cloning the bus shares the subscription table, so a clone handed to a
/// workflow and a clone kept by the caller see the same subscribers.
/// Callbacks run synchronously inside [`publish`](Self::publish) and must not
/// subscribe or unsubscribe on the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<DashMap<Uuid, EventCallback>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `key`.
    ///
    /// Returns `false` and keeps the existing subscription if `key` is
    /// already registered.
    pub fn subscribe<F>(&self, key: Uuid, callback: F) -> bool
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        match self.subscribers.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Box::new(callback));
                true
            }
        }
    }

    /// Remove the subscription under `key`. Returns whether one existed.
    pub fn unsubscribe(&self, key: &Uuid) -> bool {
        self.subscribers.remove(key).is_some()
    }

    /// Build a [`WorkflowEvent`] and deliver it to every subscriber.
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit(&self, name: impl Into<String>, payload: Value) -> usize {
        self.publish(WorkflowEvent::new(name, payload))
    }

    /// Deliver an event to every subscriber.
    pub fn publish(&self, event: WorkflowEvent) -> usize {
        let mut delivered = 0;
        for entry in self.subscribers.iter() {
            (entry.value())(&event);
            delivered += 1;
        }
        tracing::debug!(event = event.name.as_str(), delivered, "event published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscribers.len())
            .finish()
    }
}

/// Removes a subscription when dropped.
pub(crate) struct SubscriptionGuard {
    bus: EventBus,
    key: Uuid,
}

impl SubscriptionGuard {
    pub(crate) fn new(bus: EventBus, key: Uuid) -> Self {
        Self { bus, key }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.key);
    }
}
