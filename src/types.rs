//! Shared domain types for stored objects and change notifications.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Monotonically increasing per-key counter assigned by the backend
pub type ResourceVersion = u64;

/// An opaque payload together with the backend-assigned version and the
/// time-to-live requested at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub payload: Vec<u8>,
    pub version: ResourceVersion,
    /// TTL requested at write time; `None` for persistent entries
    pub ttl: Option<Duration>,
}

/// Read-side metadata accompanying a fetched object, passed to update
/// transforms so they can make a version-aware decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseMeta {
    /// Version observed at read time; zero when the key was absent
    pub version: ResourceVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

/// Raw change notification emitted by a backend subscription.
#[derive(Debug, Clone)]
pub struct BackendEvent {
    pub kind: EventKind,
    pub key: String,
    /// New state for creates and updates, last known state for deletes
    pub object: Option<StoredObject>,
    /// Backend revision at which the change committed
    pub revision: ResourceVersion,
}
