use crate::aggregation::Aggregator;
use crate::caches::{CommentCache, PostIndexCache, UserCache};
use crate::domain::PostId;
use crate::ports::{CacheBackend, Store};
use bytes::Bytes;
use dashmap::DashMap;
use shared::Result;
use shared::config::{CacheOptions, CommentLocking};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tracing::{debug, warn};

/// Owns the backend and store handles plus one lock per cache domain.
///
/// Built once at startup and handed by reference to every cache component.
/// Composite operations take domain locks one after another and never hold
/// two at once, so readers may observe one domain updated before another.
pub struct CacheCoordinator {
    backend: Arc<dyn CacheBackend>,
    store: Arc<dyn Store>,
    locks: DomainLocks,
    options: CacheOptions,
}

pub(crate) struct DomainLocks {
    pub(crate) users: Mutex<()>,
    pub(crate) post_index: Mutex<()>,
    pub(crate) comments: CommentLocks,
}

pub(crate) enum CommentLocks {
    Shared(Mutex<()>),
    /// Only posts with a holder or waiter have an entry; the last holder
    /// to release removes it.
    PerPost(DashMap<PostId, Arc<Mutex<()>>>),
}

/// Held for the duration of one comment-domain operation.
pub(crate) enum CommentGuard<'a> {
    Shared(#[allow(dead_code)] MutexGuard<'a, ()>),
    PerPost(#[allow(dead_code)] PostGuard<'a>),
}

pub(crate) struct PostGuard<'a> {
    locks: &'a DashMap<PostId, Arc<Mutex<()>>>,
    post_id: PostId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PostGuard<'_> {
    fn drop(&mut self) {
        // Release first so our own handle is not counted below.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.post_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl CommentLocks {
    fn new(mode: CommentLocking) -> Self {
        match mode {
            CommentLocking::Shared => CommentLocks::Shared(Mutex::new(())),
            CommentLocking::PerPost => CommentLocks::PerPost(DashMap::new()),
        }
    }

    pub(crate) async fn lock(&self, post_id: PostId) -> CommentGuard<'_> {
        match self {
            CommentLocks::Shared(lock) => CommentGuard::Shared(lock.lock().await),
            CommentLocks::PerPost(locks) => {
                // Clone the Arc out so the map shard is not held across the await.
                let lock = locks.entry(post_id).or_default().clone();
                CommentGuard::PerPost(PostGuard {
                    locks,
                    post_id,
                    guard: Some(lock.lock_owned().await),
                })
            }
        }
    }
}

impl CacheCoordinator {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        store: Arc<dyn Store>,
        options: CacheOptions,
    ) -> Self {
        Self {
            backend,
            store,
            locks: DomainLocks {
                users: Mutex::new(()),
                post_index: Mutex::new(()),
                comments: CommentLocks::new(options.comment_locking),
            },
            options,
        }
    }

    pub fn users(&self) -> UserCache<'_> {
        UserCache::new(self)
    }

    pub fn post_index(&self) -> PostIndexCache<'_> {
        PostIndexCache::new(self)
    }

    pub fn comments(&self) -> CommentCache<'_> {
        CommentCache::new(self)
    }

    pub fn aggregator(&self) -> Aggregator<'_> {
        Aggregator::new(self)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub(crate) fn locks(&self) -> &DomainLocks {
        &self.locks
    }

    /// Purge every entry on the backend. Used once at process start.
    pub async fn purge(&self) -> Result<()> {
        self.backend.delete_all().await
    }

    /// Drop a single entry, e.g. one reported as corrupt.
    pub async fn evict(&self, key: &str) -> bool {
        self.backend_delete(key).await
    }

    // Backend failures below are recovered as misses; the store stays authoritative.

    pub(crate) async fn backend_get(&self, key: &str) -> Option<Bytes> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("cache get '{}' failed, treating as miss: {}", key, e);
                None
            }
        }
    }

    pub(crate) async fn backend_get_multi(&self, keys: &[String]) -> HashMap<String, Bytes> {
        match self.backend.get_multi(keys).await {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    "cache multi-get of {} key(s) failed, treating all as misses: {}",
                    keys.len(),
                    e
                );
                HashMap::new()
            }
        }
    }

    pub(crate) async fn backend_set(&self, key: &str, value: Bytes) {
        if let Err(e) = self.backend.set(key, value).await {
            warn!("cache set '{}' failed: {}", key, e);
        }
    }

    /// False when the entry changed, vanished, or the backend failed.
    pub(crate) async fn backend_compare_and_set(
        &self,
        key: &str,
        expected: &[u8],
        value: Bytes,
    ) -> bool {
        match self.backend.compare_and_set(key, expected, value).await {
            Ok(swapped) => swapped,
            Err(e) => {
                warn!("cache compare-and-set '{}' failed: {}", key, e);
                false
            }
        }
    }

    pub(crate) async fn backend_delete(&self, key: &str) -> bool {
        match self.backend.delete(key).await {
            Ok(deleted) => {
                debug!("cache delete '{}' (existed: {})", key, deleted);
                deleted
            }
            Err(e) => {
                warn!("cache delete '{}' failed: {}", key, e);
                false
            }
        }
    }
}

impl Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
