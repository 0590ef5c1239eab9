//! Backend abstraction over the consistent key-value store.
//!
//! Everything above this trait assumes nothing about the backend beyond the
//! contract here: conditional writes on the resource version, key-ordered
//! prefix scans and revision-stamped change notifications. Correctness under
//! concurrency rests entirely on the conditional-write primitive, never on
//! in-process locking shared across unrelated keys.

mod hub;
mod memory;
mod sled_adapter;

pub use hub::EventSubscription;
pub use memory::*;
pub use sled_adapter::*;


use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::types::ResourceVersion;
use crate::types::StoredObject;
use crate::Result;

/// Page boundaries for a range read.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Maximum number of items to return; zero means unbounded
    pub limit: usize,
    /// Exclusive key to resume after, as handed out in
    /// [`RangeResult::continue_after`]
    pub continue_after: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RangeResult {
    /// Matches in key order
    pub items: Vec<(String, StoredObject)>,
    /// Set when more items remain past this page
    pub continue_after: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    /// Reads the current object at `key`. Expired entries read as absent.
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<StoredObject>>;

    /// Writes `payload` at `key`, assigning the next backend revision as the
    /// object's version.
    ///
    /// `expected_version` carries the conditional-write precondition: `None`
    /// writes unconditionally, `Some(0)` requires the key to be absent and
    /// any other value requires the live version to still equal it.
    ///
    /// # Errors
    /// [`crate::StorageError::Conflict`] when the precondition no longer holds.
    async fn put(
        &self,
        key: &str,
        payload: Vec<u8>,
        ttl: Option<Duration>,
        expected_version: Option<ResourceVersion>,
    ) -> Result<StoredObject>;

    /// Removes `key`, optionally only while the live version still matches.
    ///
    /// # Errors
    /// - [`crate::StorageError::NotFound`] when the key is absent
    /// - [`crate::StorageError::Conflict`] when the precondition no longer holds
    async fn delete(
        &self,
        key: &str,
        expected_version: Option<ResourceVersion>,
    ) -> Result<()>;

    /// Range-scans live objects under `prefix` in key order.
    async fn range(
        &self,
        prefix: &str,
        page: Option<PageRequest>,
    ) -> Result<RangeResult>;

    /// Number of live objects under `prefix`.
    async fn count(
        &self,
        prefix: &str,
    ) -> Result<i64>;

    /// Subscribes to change notifications for keys under `prefix`.
    async fn subscribe(
        &self,
        prefix: &str,
    ) -> Result<EventSubscription>;

    /// Sweeps expired entries, publishing a delete notification for each.
    /// Returns the number of entries removed.
    async fn compact(&self) -> Result<u64>;
}
