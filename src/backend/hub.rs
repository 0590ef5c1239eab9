//! In-process fan-out of backend change notifications.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::metrics::WATCH_SUBSCRIPTIONS_METRIC;
use crate::types::BackendEvent;

pub(crate) struct EventHub {
    subscribers: DashMap<String, HubEntry>,
}

struct HubEntry {
    prefix: String,
    tx: mpsc::UnboundedSender<BackendEvent>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        EventHub {
            subscribers: DashMap::new(),
        }
    }

    pub(crate) fn subscribe(
        hub: &Arc<EventHub>,
        prefix: &str,
    ) -> EventSubscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = nanoid::nanoid!();
        hub.subscribers.insert(
            id.clone(),
            HubEntry {
                prefix: prefix.to_string(),
                tx,
            },
        );
        WATCH_SUBSCRIPTIONS_METRIC.inc();

        EventSubscription {
            id,
            receiver,
            hub: Arc::clone(hub),
        }
    }

    /// Delivers `event` to every subscription whose prefix covers its key.
    /// Subscribers whose receiving half has gone away are dropped here.
    pub(crate) fn publish(
        &self,
        event: &BackendEvent,
    ) {
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            if !event.key.starts_with(&entry.value().prefix) {
                continue;
            }
            if entry.value().tx.send(event.clone()).is_err() {
                dead.push(entry.key().clone());
            }
        }
        for id in dead {
            if self.subscribers.remove(&id).is_some() {
                WATCH_SUBSCRIPTIONS_METRIC.dec();
            }
        }
    }
}

/// Live feed of change notifications for one key prefix.
///
/// Dropping the subscription deregisters it from the hub, so backend-side
/// resources are released as soon as the consumer goes away.
pub struct EventSubscription {
    id: String,
    receiver: mpsc::UnboundedReceiver<BackendEvent>,
    hub: Arc<EventHub>,
}

impl EventSubscription {
    pub async fn recv(&mut self) -> Option<BackendEvent> {
        self.receiver.recv().await
    }

    /// Test-only subscription fed directly by the returned sender instead of
    /// a live backend, so transport behavior can be scripted.
    #[cfg(test)]
    pub(crate) fn detached() -> (mpsc::UnboundedSender<BackendEvent>, Self) {
        let (tx, receiver) = mpsc::unbounded_channel();
        let subscription = EventSubscription {
            id: nanoid::nanoid!(),
            receiver,
            hub: Arc::new(EventHub::new()),
        };
        (tx, subscription)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if self.hub.subscribers.remove(&self.id).is_some() {
            WATCH_SUBSCRIPTIONS_METRIC.dec();
        }
    }
}
