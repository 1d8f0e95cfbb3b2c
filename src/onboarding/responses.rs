//! Response persistence: a remote sink bound to the account identity, a
//! process-local cache, and the fallback combinator joining them.
//!
//! A write that cannot reach the remote store (no identity yet, or the store
//! failed) lands in the [`TemporaryAnswerCache`] instead. The cache is drained
//! into the durable submission by [`ResponseStore::merge`] once an identity
//! exists.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DatabaseError, PersistError};
use crate::store::SubmissionStore;

use super::answer::{AnswerMap, AnswerValue};
use super::identity::Identity;

/// Destination for a single answer write.
#[async_trait]
pub trait AnswerSink: Send + Sync {
    async fn write(&self, key: &str, value: &AnswerValue) -> Result<(), PersistError>;
}

#[async_trait]
impl<T: AnswerSink + ?Sized> AnswerSink for Arc<T> {
    async fn write(&self, key: &str, value: &AnswerValue) -> Result<(), PersistError> {
        (**self).write(key, value).await
    }
}

/// Writes answers to the submission store under the bound identity.
pub struct RemoteAnswerSink {
    store: Arc<dyn SubmissionStore>,
    identity: RwLock<Option<Identity>>,
    retries: u32,
}

impl RemoteAnswerSink {
    /// `retries` extra attempts are made after a failed upsert.
    pub fn new(store: Arc<dyn SubmissionStore>, retries: u32) -> Self {
        Self {
            store,
            identity: RwLock::new(None),
            retries,
        }
    }

    pub async fn bind(&self, identity: Identity) {
        *self.identity.write().await = Some(identity);
    }
}

#[async_trait]
impl AnswerSink for RemoteAnswerSink {
    async fn write(&self, key: &str, value: &AnswerValue) -> Result<(), PersistError> {
        let Some(identity_id) = self.identity.read().await.as_ref().map(|i| i.id) else {
            return Err(PersistError::NoIdentity {
                key: key.to_string(),
            });
        };

        let mut attempt = 0;
        loop {
            match self.store.upsert(identity_id, key, value).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    debug!(key, attempt, error = %e, "Retrying remote answer write");
                }
                Err(e) => {
                    return Err(PersistError::Remote {
                        key: key.to_string(),
                        source: e,
                    });
                }
            }
        }
    }
}

/// Process-local answers that have not reached the durable store.
///
/// The backing map is created on the first write.
#[derive(Default)]
pub struct TemporaryAnswerCache {
    entries: RwLock<Option<AnswerMap>>,
}

impl TemporaryAnswerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> AnswerMap {
        self.entries.read().await.clone().unwrap_or_default()
    }

    pub async fn remove(&self, key: &str) {
        if let Some(entries) = self.entries.write().await.as_mut() {
            entries.remove(key);
        }
    }

    pub async fn clear(&self) {
        *self.entries.write().await = None;
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.as_ref().map_or(0, AnswerMap::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AnswerSink for TemporaryAnswerCache {
    async fn write(&self, key: &str, value: &AnswerValue) -> Result<(), PersistError> {
        self.entries
            .write()
            .await
            .get_or_insert_with(AnswerMap::new)
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// Which sink accepted a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landed {
    Primary,
    Fallback,
}

/// Tries `primary`, and on any error writes to `secondary` instead.
pub struct FallbackSink<P, S> {
    primary: P,
    secondary: S,
}

impl<P: AnswerSink, S: AnswerSink> FallbackSink<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }

    pub async fn write_with_fallback(
        &self,
        key: &str,
        value: &AnswerValue,
    ) -> Result<Landed, PersistError> {
        match self.primary.write(key, value).await {
            Ok(()) => Ok(Landed::Primary),
            Err(e) => {
                match &e {
                    PersistError::NoIdentity { .. } => debug!(key, "Caching answer until account exists"),
                    PersistError::Remote { .. } => warn!(key, error = %e, "Remote write failed, caching answer"),
                }
                self.secondary.write(key, value).await?;
                Ok(Landed::Fallback)
            }
        }
    }
}

#[async_trait]
impl<P: AnswerSink, S: AnswerSink> AnswerSink for FallbackSink<P, S> {
    async fn write(&self, key: &str, value: &AnswerValue) -> Result<(), PersistError> {
        self.write_with_fallback(key, value).await.map(|_| ())
    }
}

/// Combine cached answers with the in-memory map; in-memory values win.
pub fn merge_answers(cached: &AnswerMap, in_memory: &AnswerMap) -> AnswerMap {
    let mut merged = cached.clone();
    merged.extend(in_memory.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Per-session answer persistence: remote first, local cache as fallback.
pub struct ResponseStore {
    store: Arc<dyn SubmissionStore>,
    remote: Arc<RemoteAnswerSink>,
    cache: Arc<TemporaryAnswerCache>,
    sink: FallbackSink<Arc<RemoteAnswerSink>, Arc<TemporaryAnswerCache>>,
}

impl ResponseStore {
    pub fn new(store: Arc<dyn SubmissionStore>, write_retries: u32) -> Self {
        let remote = Arc::new(RemoteAnswerSink::new(Arc::clone(&store), write_retries));
        let cache = Arc::new(TemporaryAnswerCache::new());
        let sink = FallbackSink::new(Arc::clone(&remote), Arc::clone(&cache));
        Self {
            store,
            remote,
            cache,
            sink,
        }
    }

    /// Persist one answer. The last write per key wins wherever it lands.
    pub async fn write(&self, key: &str, value: &AnswerValue) -> Result<Landed, PersistError> {
        let landed = self.sink.write_with_fallback(key, value).await?;
        if landed == Landed::Primary {
            // A stale cached value must not be merged over the newer remote one.
            self.cache.remove(key).await;
        }
        Ok(landed)
    }

    /// Route future remote writes to this identity.
    pub async fn bind_identity(&self, identity: Identity) {
        self.remote.bind(identity).await;
    }

    pub async fn read_all_temporary(&self) -> AnswerMap {
        self.cache.snapshot().await
    }

    pub async fn clear_temporary(&self) {
        self.cache.clear().await;
    }

    pub async fn temporary_len(&self) -> usize {
        self.cache.len().await
    }

    /// Bulk-write the cache overlaid with `in_memory` for `identity_id`,
    /// making up to `1 + retries` attempts. Clears the cache on success and
    /// returns the number of fields written.
    pub async fn merge(
        &self,
        identity_id: Uuid,
        in_memory: &AnswerMap,
        retries: u32,
    ) -> Result<usize, DatabaseError> {
        let merged = merge_answers(&self.read_all_temporary().await, in_memory);

        let mut attempt = 0;
        loop {
            match self.store.upsert_many(identity_id, &merged).await {
                Ok(()) => break,
                Err(e) if attempt < retries => {
                    attempt += 1;
                    warn!(identity_id = %identity_id, attempt, error = %e, "Retrying answer merge");
                }
                Err(e) => return Err(e),
            }
        }

        self.clear_temporary().await;
        info!(identity_id = %identity_id, fields = merged.len(), "Answers merged");
        Ok(merged.len())
    }
}
