//! Optimistic-concurrency guarded updates.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ObjectStore;
use crate::errors::Error;
use crate::errors::StorageError;
use crate::keys::ResourceIdentity;
use crate::metrics::GUARDED_UPDATE_CONFLICTS_METRIC;
use crate::types::ResponseMeta;
use crate::types::StoredObject;
use crate::Result;

impl ObjectStore {
    /// Read-modify-write with optimistic concurrency.
    ///
    /// `transform` receives the current object (`None` when absent and
    /// `ignore_not_found` is set) together with its read-side metadata and
    /// returns the replacement payload plus an optional TTL. The write
    /// commits only if the backend's version for the key still equals the
    /// one observed at read time; on conflict the loop re-reads fresh state
    /// and re-applies `transform`. Retries are unbounded in count but each
    /// attempt re-reads, so the loop terminates as soon as no concurrent
    /// writer is racing. `cancel` aborts the next iteration.
    ///
    /// Exactly one durable write happens per successful call; the number of
    /// reads is proportional to contention. On success the updated object
    /// count is fed to the store's watermark opportunistically.
    ///
    /// # Errors
    /// - [`StorageError::NotFound`] when absent and `ignore_not_found` is false
    /// - [`StorageError::Cancelled`] once `cancel` has been triggered
    /// - transform errors pass through verbatim and are never retried
    pub async fn guarded_update<F>(
        &self,
        identity: &ResourceIdentity,
        cancel: &CancellationToken,
        ignore_not_found: bool,
        mut transform: F,
    ) -> Result<StoredObject>
    where
        F: FnMut(Option<&StoredObject>, &ResponseMeta) -> Result<(Vec<u8>, Option<Duration>)>
            + Send,
    {
        let key = self.encode_key(identity)?;
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled {
                    operation: "guarded_update",
                }
                .into());
            }

            let current = match self.backend().get(&key).await? {
                Some(stored) => Some(self.decode_object(stored)?),
                None => None,
            };
            let meta = ResponseMeta {
                version: current.as_ref().map(|object| object.version).unwrap_or(0),
            };
            if current.is_none() && !ignore_not_found {
                return Err(StorageError::NotFound { key }.into());
            }

            let (payload, ttl) = transform(current.as_ref(), &meta)?;
            let encoded = self.transformer().encode(&payload)?;

            match self.backend().put(&key, encoded, ttl, Some(meta.version)).await {
                Ok(mut stored) => {
                    stored.payload = payload;
                    self.feed_object_count().await;
                    return Ok(stored);
                }
                Err(Error::Storage(StorageError::Conflict { expected, actual, .. })) => {
                    attempt += 1;
                    debug!(
                        "guarded_update lost the write on {} (expected: {}, actual: {}), retry #{}",
                        key, expected, actual, attempt
                    );
                    GUARDED_UPDATE_CONFLICTS_METRIC
                        .with_label_values(&[self.prefix()])
                        .inc();
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Unconditional overwrite variant.
    ///
    /// The transform ignores read-side metadata and the write carries no
    /// version precondition, so no retry loop is needed: the result does not
    /// depend on prior state.
    pub async fn simple_update<F>(
        &self,
        identity: &ResourceIdentity,
        mut transform: F,
    ) -> Result<StoredObject>
    where
        F: FnMut(Option<&StoredObject>) -> Result<(Vec<u8>, Option<Duration>)> + Send,
    {
        let key = self.encode_key(identity)?;
        let current = match self.backend().get(&key).await? {
            Some(stored) => Some(self.decode_object(stored)?),
            None => None,
        };

        let (payload, ttl) = transform(current.as_ref())?;
        let encoded = self.transformer().encode(&payload)?;

        let mut stored = self.backend().put(&key, encoded, ttl, None).await?;
        stored.payload = payload;
        self.feed_object_count().await;
        Ok(stored)
    }
}
