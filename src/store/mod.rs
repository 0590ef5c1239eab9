//! Object storage facade.
//!
//! [`ObjectStore`] is what typed resource clients and controllers call:
//! get/list/watch/guarded-update/delete over one resource kind, composing
//! the key codec, the trigger index, the value transformer and the
//! object-count watermark on top of a [`KvBackend`]. No in-process lock
//! serializes facade operations; correctness under concurrency rests on the
//! backend's conditional-write primitive.

mod maintenance;
mod transformer;
mod update;
mod watch;

pub use maintenance::*;
pub use transformer::*;
pub use update::*;
pub use watch::*;

#[cfg(test)]
mod watch_test;

use std::sync::Arc;

use tracing::debug;

use crate::backend::KvBackend;
use crate::backend::PageRequest;
use crate::errors::StorageError;
use crate::index::NoTrigger;
use crate::index::TriggerExtractor;
use crate::keys;
use crate::keys::ResourceIdentity;
use crate::metrics::HighWaterMark;
use crate::metrics::STORED_OBJECTS_METRIC;
use crate::types::StoredObject;
use crate::Result;

/// Whether a resource kind carries a namespace in its identity.
///
/// Selected once at store construction so a kind can never be encoded with
/// the wrong key variant through the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Namespaced,
    AccountScoped,
}

/// Bounds for list, watch and count: the store's whole key space, one
/// account, or one namespace within an account.
#[derive(Debug, Clone)]
pub enum ListScope {
    All,
    Account(String),
    Namespace {
        account_id: String,
        namespace: String,
    },
}

/// One page of list results.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub items: Vec<(ResourceIdentity, StoredObject)>,
    /// Continue token for the next page; feed back through
    /// [`PageRequest::continue_after`]
    pub continue_after: Option<String>,
}

pub struct ObjectStore {
    backend: Arc<dyn KvBackend>,
    prefix: String,
    scope: Scope,
    extractor: Arc<dyn TriggerExtractor>,
    transformer: Arc<dyn ValueTransformer>,
    paging: bool,
    count_watermark: HighWaterMark,
}

impl ObjectStore {
    /// Creates a store for one resource kind under `prefix`, with the
    /// degenerate trigger policy and no at-rest transformation.
    pub fn new(
        backend: Arc<dyn KvBackend>,
        prefix: impl Into<String>,
        scope: Scope,
    ) -> Self {
        ObjectStore {
            backend,
            prefix: prefix.into(),
            scope,
            extractor: Arc::new(NoTrigger),
            transformer: Arc::new(IdentityTransformer),
            paging: false,
            count_watermark: HighWaterMark::new(),
        }
    }

    /// Installs the per-kind trigger extraction policy.
    pub fn with_extractor(
        mut self,
        extractor: Arc<dyn TriggerExtractor>,
    ) -> Self {
        self.extractor = extractor;
        self
    }

    /// Installs the at-rest value transformer.
    pub fn with_transformer(
        mut self,
        transformer: Arc<dyn ValueTransformer>,
    ) -> Self {
        self.transformer = transformer;
        self
    }

    /// Enables list paging. Without it page requests are ignored and lists
    /// return the full range.
    pub fn with_paging(
        mut self,
        paging: bool,
    ) -> Self {
        self.paging = paging;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    pub(crate) fn transformer(&self) -> &Arc<dyn ValueTransformer> {
        &self.transformer
    }

    pub(crate) fn extractor(&self) -> &Arc<dyn TriggerExtractor> {
        &self.extractor
    }

    pub(crate) fn is_namespaced(&self) -> bool {
        matches!(self.scope, Scope::Namespaced)
    }

    pub(crate) fn encode_key(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<String> {
        match self.scope {
            Scope::Namespaced => keys::namespace_key(&self.prefix, identity),
            Scope::AccountScoped => keys::account_key(&self.prefix, identity),
        }
    }

    pub(crate) fn scope_prefix(
        &self,
        scope: &ListScope,
    ) -> Result<String> {
        match scope {
            ListScope::All => Ok(format!("{}/", self.prefix)),
            ListScope::Account(account_id) => {
                keys::validate_segment("account", account_id)?;
                Ok(format!("{}/{}/", self.prefix, account_id))
            }
            ListScope::Namespace { account_id, namespace } => {
                keys::validate_segment("account", account_id)?;
                keys::validate_segment("namespace", namespace)?;
                Ok(format!("{}/{}/{}/", self.prefix, account_id, namespace))
            }
        }
    }

    pub(crate) fn decode_object(
        &self,
        mut stored: StoredObject,
    ) -> Result<StoredObject> {
        stored.payload = self.transformer.decode(&stored.payload)?;
        Ok(stored)
    }

    /// Fetches a single object.
    ///
    /// # Errors
    /// [`StorageError::NotFound`] when the key is absent.
    pub async fn get(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<StoredObject> {
        let key = self.encode_key(identity)?;
        match self.backend.get(&key).await? {
            Some(stored) => self.decode_object(stored),
            None => Err(StorageError::NotFound { key }.into()),
        }
    }

    /// Lists objects under `scope` in key order.
    ///
    /// Paging is honored only when enabled for this store; otherwise the
    /// page request is ignored and the full range comes back at once.
    pub async fn list(
        &self,
        scope: &ListScope,
        page: Option<PageRequest>,
    ) -> Result<ListResult> {
        let prefix = self.scope_prefix(scope)?;
        let page = if self.paging { page } else { None };
        let range = self.backend.range(&prefix, page).await?;

        let mut items = Vec::with_capacity(range.items.len());
        for (key, stored) in range.items {
            let identity = keys::parse_key(&self.prefix, &key, self.is_namespaced())?;
            items.push((identity, self.decode_object(stored)?));
        }

        Ok(ListResult {
            items,
            continue_after: range.continue_after,
        })
    }

    /// Deletes an object, unconditionally or only while the live version
    /// still equals `precondition`.
    ///
    /// # Errors
    /// - [`StorageError::NotFound`] when the key is absent
    /// - [`StorageError::Conflict`] when the precondition no longer holds;
    ///   never retried here
    pub async fn delete(
        &self,
        identity: &ResourceIdentity,
        precondition: Option<u64>,
    ) -> Result<()> {
        let key = self.encode_key(identity)?;
        self.backend.delete(&key, precondition).await
    }

    /// Asks the backend to sweep expired entries.
    pub async fn compact(&self) -> Result<u64> {
        self.backend.compact().await
    }

    /// High-water mark of the object count observed for this store.
    pub fn count_watermark(&self) -> &HighWaterMark {
        &self.count_watermark
    }

    /// Feeds the current object count into the watermark and, when it grew,
    /// into the exported gauge. Failures are logged and swallowed; the
    /// metric is opportunistic.
    pub(crate) async fn feed_object_count(&self) {
        let prefix = format!("{}/", self.prefix);
        match self.backend.count(&prefix).await {
            Ok(count) => {
                if self.count_watermark.update(count) {
                    STORED_OBJECTS_METRIC.with_label_values(&[self.prefix.as_str()]).set(count);
                }
            }
            Err(e) => {
                debug!("object count poll failed: {:?}", e);
            }
        }
    }
}
