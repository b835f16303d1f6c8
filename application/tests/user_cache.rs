mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::{CountingStore, FailingBackend, Harness};
use gramcache::domain::User;
use gramcache::keys;
use gramcache::{CacheBackend, CacheCoordinator, SledStore};
use shared::Error;
use shared::config::{CacheOptions, SoftDeletePolicy};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use storage_engine::MokaBackend;
use tempfile::TempDir;

/// Rewrites the entry with a newer snapshot just before each of the first
/// `races` conditional writes reaches the real backend.
struct RacingWriter {
    inner: MokaBackend,
    races: AtomicUsize,
}

impl RacingWriter {
    fn new(inner: MokaBackend, races: usize) -> Self {
        Self {
            inner,
            races: AtomicUsize::new(races),
        }
    }
}

#[async_trait]
impl CacheBackend for RacingWriter {
    async fn get(&self, key: &str) -> shared::Result<Option<Bytes>> {
        self.inner.get(key).await
    }

    async fn get_multi(&self, keys: &[String]) -> shared::Result<HashMap<String, Bytes>> {
        self.inner.get_multi(keys).await
    }

    async fn set(&self, key: &str, value: Bytes) -> shared::Result<()> {
        self.inner.set(key, value).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &[u8],
        value: Bytes,
    ) -> shared::Result<bool> {
        let racing = self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if racing {
            let mut user: User = serde_json::from_slice(expected).unwrap();
            user.passhash = format!("{}+rotated", user.passhash);
            let newer = Bytes::from(serde_json::to_vec(&user).unwrap());
            self.inner.set(key, newer).await?;
        }
        self.inner.compare_and_set(key, expected, value).await
    }

    async fn delete(&self, key: &str) -> shared::Result<bool> {
        self.inner.delete(key).await
    }

    async fn delete_all(&self) -> shared::Result<()> {
        self.inner.delete_all().await
    }
}

fn racing_coordinator(
    dir: &TempDir,
    backend: MokaBackend,
    races: usize,
) -> (Arc<CountingStore>, CacheCoordinator) {
    let store = Arc::new(CountingStore::new(
        SledStore::open(dir.path().join("db"), 2).unwrap(),
    ));
    let coordinator = CacheCoordinator::new(
        Arc::new(RacingWriter::new(backend, races)),
        store.clone(),
        CacheOptions {
            soft_delete: SoftDeletePolicy::CompareAndSwap,
            ..CacheOptions::default()
        },
    );
    (store, coordinator)
}

#[tokio::test]
async fn test_batch_get_returns_exactly_the_existing_ids() {
    let h = Harness::new();
    let a = h.seed_user("alice").await;
    let b = h.seed_user("bob").await;

    // Warm one of them so the call mixes hits and misses.
    h.coordinator.users().batch_get(&[a]).await.unwrap();

    let found = h.coordinator.users().batch_get(&[a, b, 999, a]).await.unwrap();
    let ids: BTreeSet<_> = found.keys().copied().collect();
    assert_eq!(ids, BTreeSet::from([a, b]));
    assert_eq!(found[&b].account_name, "bob");
}

#[tokio::test]
async fn test_batch_get_repeat_issues_no_store_queries() {
    let h = Harness::new();
    let a = h.seed_user("alice").await;
    let b = h.seed_user("bob").await;

    let first = h.coordinator.users().batch_get(&[a, b]).await.unwrap();
    h.store.reset();

    let second = h.coordinator.users().batch_get(&[b, a]).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.store.total_calls(), 0);
}

#[tokio::test]
async fn test_missing_id_is_refetched_alone() {
    let h = Harness::new();
    for name in ["u_one", "u_two", "u_three"] {
        h.seed_user(name).await;
    }

    let found = h.coordinator.users().batch_get(&[1, 2, 4]).await.unwrap();
    assert_eq!(found.keys().copied().collect::<BTreeSet<_>>(), BTreeSet::from([1, 2]));
    assert!(h.cached(&keys::user(1)).await.is_some());
    assert!(h.cached(&keys::user(2)).await.is_some());
    assert!(h.cached(&keys::user(3)).await.is_none());
    assert!(h.cached(&keys::user(4)).await.is_none());

    h.store.reset();
    h.coordinator.users().batch_get(&[1, 2, 4]).await.unwrap();
    assert_eq!(h.store.user_batches(), vec![vec![4]]);
}

#[tokio::test]
async fn test_created_user_is_served_from_cache() {
    let h = Harness::new();
    let id = h.coordinator.users().create("carol", "secret-hash").await.unwrap();
    h.store.reset();

    let found = h.coordinator.users().batch_get(&[id]).await.unwrap();
    let user = &found[&id];
    assert_eq!(user.account_name, "carol");
    assert_eq!(user.passhash, "secret-hash");
    assert!(!user.is_admin());
    assert!(!user.is_deleted());
    assert_eq!(h.store.calls("users_by_ids"), 0);
}

#[tokio::test]
async fn test_corrupt_entry_is_reported_and_left_in_place() {
    let h = Harness::new();
    let id = h.seed_user("alice").await;
    let key = keys::user(id);
    h.backend.set(&key, Bytes::from_static(b"\x00not json")).await.unwrap();

    let err = h.coordinator.users().batch_get(&[id]).await.unwrap_err();
    assert!(matches!(&err, Error::CacheCorruption { key: k, .. } if *k == key));
    assert!(h.cached(&key).await.is_some());

    // Evicting the entry repairs it.
    assert!(h.coordinator.evict(&key).await);
    let found = h.coordinator.users().batch_get(&[id]).await.unwrap();
    assert_eq!(found[&id].account_name, "alice");
}

#[tokio::test]
async fn test_entry_for_another_user_is_corruption() {
    let h = Harness::new();
    let a = h.seed_user("alice").await;
    let b = h.seed_user("bob").await;
    h.coordinator.users().batch_get(&[a]).await.unwrap();

    let alice = h.cached(&keys::user(a)).await.unwrap();
    h.backend.set(&keys::user(b), alice).await.unwrap();

    let err = h.coordinator.users().batch_get(&[b]).await.unwrap_err();
    assert!(matches!(err, Error::CacheCorruption { .. }));
}

#[tokio::test]
async fn test_unreachable_backend_falls_back_to_store() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CountingStore::new(
        SledStore::open(dir.path().join("db"), 2).unwrap(),
    ));
    let coordinator = CacheCoordinator::new(
        Arc::new(FailingBackend),
        store.clone(),
        CacheOptions::default(),
    );

    let id = coordinator.users().create("dave", "h").await.unwrap();
    let found = coordinator.users().batch_get(&[id]).await.unwrap();
    assert_eq!(found[&id].account_name, "dave");

    let again = coordinator.users().batch_get(&[id]).await.unwrap();
    assert_eq!(found, again);
    assert_eq!(store.calls("users_by_ids"), 2);
}

#[tokio::test]
async fn test_soft_delete_rewrites_cached_snapshot() {
    let h = Harness::new();
    let id = h.seed_user("eve").await;
    h.coordinator.users().batch_get(&[id]).await.unwrap();

    assert!(h.coordinator.users().invalidate_soft_delete(id).await.unwrap());

    let found = h.coordinator.users().batch_get(&[id]).await.unwrap();
    assert!(found[&id].is_deleted());
}

#[tokio::test]
async fn test_soft_delete_of_uncached_user_stays_absent() {
    let h = Harness::new();
    let id = h.seed_user("frank").await;

    assert!(!h.coordinator.users().invalidate_soft_delete(id).await.unwrap());
    assert!(h.cached(&keys::user(id)).await.is_none());
    assert_eq!(h.store.calls("users_by_ids"), 0);
}

#[tokio::test]
async fn test_checked_soft_delete_updates_an_idle_entry() {
    let h = Harness::with_options(CacheOptions {
        soft_delete: SoftDeletePolicy::CompareAndSwap,
        ..CacheOptions::default()
    });
    let id = h.seed_user("grace").await;
    h.coordinator.users().batch_get(&[id]).await.unwrap();

    assert!(h.coordinator.users().invalidate_soft_delete(id).await.unwrap());

    let raw = h.cached(&keys::user(id)).await.unwrap();
    let user: User = serde_json::from_slice(&raw).unwrap();
    assert!(user.del_flg);
}

#[tokio::test]
async fn test_warm_caches_every_user() {
    let h = Harness::new();
    let a = h.seed_user("heidi").await;
    let b = h.seed_user("ivan").await;

    assert_eq!(h.coordinator.users().warm().await.unwrap(), 2);
    h.store.reset();

    h.coordinator.users().batch_get(&[a, b]).await.unwrap();
    assert_eq!(h.store.total_calls(), 0);
}

#[tokio::test]
async fn test_checked_soft_delete_keeps_concurrent_write() {
    let dir = TempDir::new().unwrap();
    let backend = MokaBackend::new_unbounded();
    let (_store, coordinator) = racing_coordinator(&dir, backend.clone(), 1);

    let id = coordinator.users().create("judy", "orig").await.unwrap();
    assert!(coordinator.users().invalidate_soft_delete(id).await.unwrap());

    let raw = backend.get(&keys::user(id)).await.unwrap().unwrap();
    let user: User = serde_json::from_slice(&raw).unwrap();
    assert_eq!(user.passhash, "orig+rotated");
    assert!(user.del_flg);
}

#[tokio::test]
async fn test_checked_soft_delete_evicts_when_always_contended() {
    let dir = TempDir::new().unwrap();
    let backend = MokaBackend::new_unbounded();
    let (store, coordinator) = racing_coordinator(&dir, backend.clone(), usize::MAX);

    let id = coordinator.users().create("kim", "orig").await.unwrap();
    assert!(!coordinator.users().invalidate_soft_delete(id).await.unwrap());
    assert!(backend.get(&keys::user(id)).await.unwrap().is_none());

    // The next read rebuilds from the store.
    store.reset();
    let found = coordinator.users().batch_get(&[id]).await.unwrap();
    assert_eq!(found[&id].passhash, "orig");
    assert_eq!(store.calls("users_by_ids"), 1);
}
