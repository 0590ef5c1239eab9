//! In-memory backend used by tests and single-process embedded deployments.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

use super::hub::EventHub;
use super::EventSubscription;
use super::KvBackend;
use super::PageRequest;
use super::RangeResult;
use crate::errors::StorageError;
use crate::types::BackendEvent;
use crate::types::EventKind;
use crate::types::ResourceVersion;
use crate::types::StoredObject;
use crate::Result;

pub struct MemoryBackend {
    inner: RwLock<MemoryInner>,
    hub: Arc<EventHub>,
}

#[derive(Default)]
struct MemoryInner {
    entries: BTreeMap<String, MemoryEntry>,
    revision: ResourceVersion,
}

#[derive(Clone)]
struct MemoryEntry {
    payload: Vec<u8>,
    version: ResourceVersion,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(
        &self,
        now: Instant,
    ) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn to_object(&self) -> StoredObject {
        StoredObject {
            payload: self.payload.clone(),
            version: self.version,
            ttl: self.ttl,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            inner: RwLock::new(MemoryInner::default()),
            hub: Arc::new(EventHub::new()),
        }
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.inner.read().entries.len())
            .finish()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<StoredObject>> {
        let now = Instant::now();
        let inner = self.inner.read();
        Ok(inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(MemoryEntry::to_object))
    }

    async fn put(
        &self,
        key: &str,
        payload: Vec<u8>,
        ttl: Option<Duration>,
        expected_version: Option<ResourceVersion>,
    ) -> Result<StoredObject> {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let actual = inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.version)
            .unwrap_or(0);
        if let Some(expected) = expected_version {
            if expected != actual {
                return Err(StorageError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual,
                }
                .into());
            }
        }

        inner.revision += 1;
        let entry = MemoryEntry {
            payload,
            version: inner.revision,
            ttl,
            expires_at: ttl.map(|ttl| now + ttl),
        };
        let object = entry.to_object();
        inner.entries.insert(key.to_string(), entry);

        // Published under the write lock so notification order matches
        // commit order.
        self.hub.publish(&BackendEvent {
            kind: if actual == 0 { EventKind::Created } else { EventKind::Updated },
            key: key.to_string(),
            object: Some(object.clone()),
            revision: object.version,
        });

        Ok(object)
    }

    async fn delete(
        &self,
        key: &str,
        expected_version: Option<ResourceVersion>,
    ) -> Result<()> {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let live = inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(MemoryEntry::to_object);
        let last = match live {
            Some(object) => object,
            None => {
                return Err(StorageError::NotFound { key: key.to_string() }.into());
            }
        };
        if let Some(expected) = expected_version {
            if expected != last.version {
                return Err(StorageError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual: last.version,
                }
                .into());
            }
        }

        inner.entries.remove(key);
        inner.revision += 1;
        self.hub.publish(&BackendEvent {
            kind: EventKind::Deleted,
            key: key.to_string(),
            object: Some(last),
            revision: inner.revision,
        });

        Ok(())
    }

    async fn range(
        &self,
        prefix: &str,
        page: Option<PageRequest>,
    ) -> Result<RangeResult> {
        let now = Instant::now();
        let (limit, start_after) = match page {
            Some(page) => (page.limit, page.continue_after),
            None => (0, None),
        };
        let lower = match &start_after {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Included(prefix.to_string()),
        };

        let inner = self.inner.read();
        let mut items: Vec<(String, StoredObject)> = Vec::new();
        let mut continue_after = None;
        for (key, entry) in inner.entries.range((lower, Bound::Unbounded)) {
            if !key.starts_with(prefix) {
                break;
            }
            if entry.is_expired(now) {
                continue;
            }
            if limit != 0 && items.len() == limit {
                continue_after = items.last().map(|item| item.0.clone());
                break;
            }
            items.push((key.clone(), entry.to_object()));
        }

        Ok(RangeResult { items, continue_after })
    }

    async fn count(
        &self,
        prefix: &str,
    ) -> Result<i64> {
        let now = Instant::now();
        let inner = self.inner.read();
        let count = inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count();
        Ok(count as i64)
    }

    async fn subscribe(
        &self,
        prefix: &str,
    ) -> Result<EventSubscription> {
        Ok(EventHub::subscribe(&self.hub, prefix))
    }

    async fn compact(&self) -> Result<u64> {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            let last = inner.entries.remove(key).map(|entry| entry.to_object());
            inner.revision += 1;
            self.hub.publish(&BackendEvent {
                kind: EventKind::Deleted,
                key: key.clone(),
                object: last,
                revision: inner.revision,
            });
        }

        Ok(expired.len() as u64)
    }
}
