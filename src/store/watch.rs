//! Live change subscriptions.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::ListScope;
use super::ObjectStore;
use super::ValueTransformer;
use crate::backend::EventSubscription;
use crate::index::MatchValue;
use crate::index::TriggerExtractor;
use crate::keys;
use crate::keys::ResourceIdentity;
use crate::types::BackendEvent;
use crate::types::EventKind;
use crate::types::ResourceVersion;
use crate::types::StoredObject;
use crate::Result;

/// Bounded buffer between the forwarder task and the consumer
const WATCH_CHANNEL_CAPACITY: usize = 128;

/// Subscription-side filter.
///
/// With a trigger selector set, changes whose kind yields trigger values are
/// pre-filtered by cheap [`MatchValue`] comparison; objects yielding none
/// fall back to the extractor's linear predicate. Without a selector every
/// change is delivered.
#[derive(Debug, Clone, Default)]
pub struct WatchFilter {
    pub trigger: Option<MatchValue>,
}

impl WatchFilter {
    pub fn everything() -> Self {
        WatchFilter::default()
    }

    pub fn with_trigger(trigger: MatchValue) -> Self {
        WatchFilter {
            trigger: Some(trigger),
        }
    }
}

/// A change notification delivered to a watch subscriber.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub identity: ResourceIdentity,
    /// New state for creates and updates, last known state for deletes
    pub object: Option<StoredObject>,
    pub revision: ResourceVersion,
    /// Trigger values extracted from the object at delivery time
    pub triggers: Vec<MatchValue>,
}

/// Live, ordered, cancellable sequence of change events.
///
/// Events for a given key arrive in strictly increasing version order;
/// events across different keys carry no cross-key ordering guarantee beyond
/// the backend's own. Cancelling (or dropping) the stream stops delivery and
/// releases the backend-side subscription.
pub struct WatchStream {
    receiver: mpsc::Receiver<WatchEvent>,
    cancel: CancellationToken,
}

impl WatchStream {
    /// Next event, or `None` once the stream has terminated.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.receiver.recv().await
    }

    /// Stops delivery. Events already buffered may still be drained; nothing
    /// new is observed after the forwarder acknowledges the cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl futures::Stream for WatchStream {
    type Item = WatchEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<WatchEvent>> {
        self.receiver.poll_recv(cx)
    }
}

impl ObjectStore {
    /// Opens a watch over `scope`.
    ///
    /// The returned stream yields create/update/delete events filtered
    /// through `filter` and this store's trigger policy. `cancel` may be
    /// triggered by the caller at any time; the stream then ends and the
    /// backend subscription is dropped.
    pub async fn watch(
        &self,
        scope: &ListScope,
        filter: WatchFilter,
        cancel: CancellationToken,
    ) -> Result<WatchStream> {
        let prefix = self.scope_prefix(scope)?;
        let subscription = self.backend().subscribe(&prefix).await?;
        let (tx, receiver) = mpsc::channel(WATCH_CHANNEL_CAPACITY);

        let forwarder = WatchForwarder {
            subscription,
            tx,
            cancel: cancel.clone(),
            filter,
            extractor: Arc::clone(self.extractor()),
            transformer: Arc::clone(self.transformer()),
            prefix: self.prefix().to_string(),
            namespaced: self.is_namespaced(),
            last_delivered: HashMap::new(),
        };
        tokio::spawn(forwarder.run());

        Ok(WatchStream { receiver, cancel })
    }
}

struct WatchForwarder {
    subscription: EventSubscription,
    tx: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
    filter: WatchFilter,
    extractor: Arc<dyn TriggerExtractor>,
    transformer: Arc<dyn ValueTransformer>,
    prefix: String,
    namespaced: bool,
    /// Highest revision forwarded (or filtered) per key; enforces strictly
    /// increasing per-key delivery even when the transport reorders
    last_delivered: HashMap<String, ResourceVersion>,
}

impl WatchForwarder {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.subscription.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let Some(event) = self.translate(event) else {
                continue;
            };
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                sent = self.tx.send(event) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("watch forwarder for {} stopped", self.prefix);
    }

    fn translate(
        &mut self,
        event: BackendEvent,
    ) -> Option<WatchEvent> {
        let last = self.last_delivered.get(&event.key).copied().unwrap_or(0);
        if event.revision <= last {
            warn!(
                "dropping out-of-order event for {} (revision {} <= {})",
                event.key, event.revision, last
            );
            return None;
        }

        let identity = match keys::parse_key(&self.prefix, &event.key, self.namespaced) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("skipping event for foreign key {}: {:?}", event.key, e);
                return None;
            }
        };

        let object = match event.object {
            Some(mut stored) => match self.transformer.decode(&stored.payload) {
                Ok(plain) => {
                    stored.payload = plain;
                    Some(stored)
                }
                Err(e) => {
                    warn!("skipping undecodable event for {}: {:?}", event.key, e);
                    return None;
                }
            },
            None => None,
        };

        // A filtered-out change still advances the key's cursor.
        self.last_delivered.insert(event.key, event.revision);

        let triggers = object
            .as_ref()
            .map(|object| self.extractor.extract_triggers(&object.payload))
            .unwrap_or_default();
        if !self.filter_matches(object.as_ref(), &triggers) {
            return None;
        }

        Some(WatchEvent {
            kind: event.kind,
            identity,
            object,
            revision: event.revision,
            triggers,
        })
    }

    fn filter_matches(
        &self,
        object: Option<&StoredObject>,
        triggers: &[MatchValue],
    ) -> bool {
        let Some(selector) = &self.filter.trigger else {
            return true;
        };
        // Without object state there is nothing to evaluate against;
        // deliver rather than silently lose the change.
        let Some(object) = object else {
            return true;
        };
        if triggers.is_empty() {
            return self.extractor.matches(&object.payload);
        }
        triggers.iter().any(|trigger| trigger == selector)
    }
}
