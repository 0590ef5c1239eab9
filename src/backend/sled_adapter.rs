//! Durable embedded backend built on sled.
//!
//! Objects are stored as bincode envelopes in one tree; a second tree holds
//! the backend revision counter. Conditional writes run under a short
//! adapter-level lock so that revision assignment, the version check and the
//! change notification commit as one ordered step.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

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
use crate::Error;
use crate::Result;

//---
// Database namespaces
/// Sled database tree namespaces
const OBJECT_NAMESPACE: &str = "objects";
const META_NAMESPACE: &str = "meta";

/// Meta tree key holding the revision counter
const REVISION_KEY: &str = "_revision";

#[derive(Serialize, Deserialize)]
struct Envelope {
    payload: Vec<u8>,
    version: ResourceVersion,
    ttl_ms: Option<u64>,
    expires_at_ms: Option<u64>,
}

impl Envelope {
    fn is_expired(
        &self,
        now_ms: u64,
    ) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }

    fn to_object(&self) -> StoredObject {
        StoredObject {
            payload: self.payload.clone(),
            version: self.version,
            ttl: self.ttl_ms.map(Duration::from_millis),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

pub struct SledBackend {
    db: Arc<sled::Db>,
    tree: Arc<sled::Tree>,
    meta: Arc<sled::Tree>,
    /// Serializes conditional writes so notification order matches commit order
    write_lock: Mutex<()>,
    hub: Arc<EventHub>,
}

impl std::fmt::Debug for SledBackend {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledBackend")
            .field("tree_len", &self.tree.len())
            .finish()
    }
}

impl SledBackend {
    /// Opens (or creates) the backing database at `path`.
    pub fn open(path: impl AsRef<Path> + std::fmt::Debug) -> Result<Self> {
        debug!("open sled object store from path: {:?}", &path);

        let db = sled::Config::default()
            .path(path.as_ref())
            .cache_capacity(10 * 1024 * 1024) //10MB
            .flush_every_ms(Some(3))
            .use_compression(true)
            .compression_factor(1)
            .open()
            .map_err(|e| {
                warn!(
                    "Try to open DB at this location: {:?} and failed: {:?}",
                    path, e
                );
                Error::from(e)
            })?;
        let tree = db.open_tree(OBJECT_NAMESPACE)?;
        let meta = db.open_tree(META_NAMESPACE)?;

        Ok(SledBackend {
            db: Arc::new(db),
            tree: Arc::new(tree),
            meta: Arc::new(meta),
            write_lock: Mutex::new(()),
            hub: Arc::new(EventHub::new()),
        })
    }

    pub fn flush(&self) -> Result<usize> {
        let bytes = self.db.flush()?;
        Ok(bytes)
    }

    /// Allocates the next revision. Must run under `write_lock`.
    fn next_revision(&self) -> Result<ResourceVersion> {
        let current = match self.meta.get(REVISION_KEY)? {
            Some(ivec) => decode_revision(&ivec)?,
            None => 0,
        };
        let next = current + 1;
        self.meta.insert(REVISION_KEY, &next.to_be_bytes())?;
        Ok(next)
    }

    fn read_envelope(
        &self,
        key: &str,
    ) -> Result<Option<Envelope>> {
        match self.tree.get(key)? {
            Some(ivec) => Ok(Some(bincode::deserialize::<Envelope>(&ivec)?)),
            None => Ok(None),
        }
    }
}

fn decode_revision(bytes: &[u8]) -> Result<ResourceVersion> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| StorageError::Corrupt {
        key: REVISION_KEY.to_string(),
    })?;
    Ok(u64::from_be_bytes(array))
}

#[async_trait]
impl KvBackend for SledBackend {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<StoredObject>> {
        let now = now_ms();
        Ok(self
            .read_envelope(key)?
            .filter(|envelope| !envelope.is_expired(now))
            .map(|envelope| envelope.to_object()))
    }

    async fn put(
        &self,
        key: &str,
        payload: Vec<u8>,
        ttl: Option<Duration>,
        expected_version: Option<ResourceVersion>,
    ) -> Result<StoredObject> {
        let _guard = self.write_lock.lock();
        let now = now_ms();

        let actual = self
            .read_envelope(key)?
            .filter(|envelope| !envelope.is_expired(now))
            .map(|envelope| envelope.version)
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

        let version = self.next_revision()?;
        let envelope = Envelope {
            payload,
            version,
            ttl_ms: ttl.map(|ttl| ttl.as_millis() as u64),
            expires_at_ms: ttl.map(|ttl| now + ttl.as_millis() as u64),
        };
        let object = envelope.to_object();
        self.tree.insert(key, bincode::serialize(&envelope)?)?;

        self.hub.publish(&BackendEvent {
            kind: if actual == 0 { EventKind::Created } else { EventKind::Updated },
            key: key.to_string(),
            object: Some(object.clone()),
            revision: version,
        });

        Ok(object)
    }

    async fn delete(
        &self,
        key: &str,
        expected_version: Option<ResourceVersion>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let now = now_ms();

        let last = match self
            .read_envelope(key)?
            .filter(|envelope| !envelope.is_expired(now))
        {
            Some(envelope) => envelope.to_object(),
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

        self.tree.remove(key)?;
        let revision = self.next_revision()?;
        self.hub.publish(&BackendEvent {
            kind: EventKind::Deleted,
            key: key.to_string(),
            object: Some(last),
            revision,
        });

        Ok(())
    }

    async fn range(
        &self,
        prefix: &str,
        page: Option<PageRequest>,
    ) -> Result<RangeResult> {
        let now = now_ms();
        let (limit, start_after) = match page {
            Some(page) => (page.limit, page.continue_after),
            None => (0, None),
        };

        let mut items = Vec::new();
        let mut continue_after = None;
        for entry in self.tree.scan_prefix(prefix.as_bytes()) {
            let (raw_key, raw_value) = entry?;
            let key = String::from_utf8(raw_key.to_vec()).map_err(|_| StorageError::Corrupt {
                key: String::from_utf8_lossy(&raw_key).into_owned(),
            })?;
            if let Some(after) = &start_after {
                if key.as_str() <= after.as_str() {
                    continue;
                }
            }
            let envelope = bincode::deserialize::<Envelope>(&raw_value)?;
            if envelope.is_expired(now) {
                continue;
            }
            if limit != 0 && items.len() == limit {
                continue_after = items.last().map(|item: &(String, StoredObject)| item.0.clone());
                break;
            }
            items.push((key, envelope.to_object()));
        }

        Ok(RangeResult { items, continue_after })
    }

    async fn count(
        &self,
        prefix: &str,
    ) -> Result<i64> {
        let now = now_ms();
        let mut count = 0i64;
        for entry in self.tree.scan_prefix(prefix.as_bytes()) {
            let (_, raw_value) = entry?;
            let envelope = bincode::deserialize::<Envelope>(&raw_value)?;
            if !envelope.is_expired(now) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn subscribe(
        &self,
        prefix: &str,
    ) -> Result<EventSubscription> {
        Ok(EventHub::subscribe(&self.hub, prefix))
    }

    async fn compact(&self) -> Result<u64> {
        let _guard = self.write_lock.lock();
        let now = now_ms();

        let mut expired = Vec::new();
        for entry in self.tree.iter() {
            let (raw_key, raw_value) = entry?;
            let envelope = bincode::deserialize::<Envelope>(&raw_value)?;
            if envelope.is_expired(now) {
                expired.push((raw_key, envelope.to_object()));
            }
        }

        let pruned = expired.len() as u64;
        for (raw_key, last) in expired {
            let key = String::from_utf8_lossy(&raw_key).into_owned();
            self.tree.remove(&raw_key)?;
            let revision = self.next_revision()?;
            self.hub.publish(&BackendEvent {
                kind: EventKind::Deleted,
                key,
                object: Some(last),
                revision,
            });
        }

        Ok(pruned)
    }
}
