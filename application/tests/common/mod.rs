#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use gramcache::domain::{
    Baseline, Comment, CommentId, ImageMime, NewComment, NewPost, NewUser, Post, PostId, User,
    UserId,
};
use gramcache::{CacheBackend, CacheCoordinator, SledStore, Store};
use shared::config::CacheOptions;
use shared::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use storage_engine::MokaBackend;
use tempfile::TempDir;

/// Wraps a sled store and records every query that reaches it.
pub struct CountingStore {
    inner: SledStore,
    calls: Mutex<HashMap<&'static str, usize>>,
    user_batches: Mutex<Vec<Vec<UserId>>>,
}

impl CountingStore {
    pub fn new(inner: SledStore) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
            user_batches: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, query: &'static str) {
        *self.calls.lock().unwrap().entry(query).or_default() += 1;
    }

    pub fn calls(&self, query: &str) -> usize {
        self.calls.lock().unwrap().get(query).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// The id lists passed to `users_by_ids`, in call order.
    pub fn user_batches(&self) -> Vec<Vec<UserId>> {
        self.user_batches.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
        self.user_batches.lock().unwrap().clear();
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn users_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>> {
        self.record("users_by_ids");
        self.user_batches.lock().unwrap().push(ids.to_vec());
        self.inner.users_by_ids(ids).await
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        self.record("all_users");
        self.inner.all_users().await
    }

    async fn find_user_by_account_name(&self, account_name: &str) -> Result<Option<User>> {
        self.record("find_user_by_account_name");
        self.inner.find_user_by_account_name(account_name).await
    }

    async fn account_name_exists(&self, account_name: &str) -> Result<bool> {
        self.record("account_name_exists");
        self.inner.account_name_exists(account_name).await
    }

    async fn insert_user(&self, user: &NewUser) -> Result<UserId> {
        self.record("insert_user");
        self.inner.insert_user(user).await
    }

    async fn set_user_deleted(&self, id: UserId, deleted: bool) -> Result<bool> {
        self.record("set_user_deleted");
        self.inner.set_user_deleted(id, deleted).await
    }

    async fn active_regular_users(&self) -> Result<Vec<User>> {
        self.record("active_regular_users");
        self.inner.active_regular_users().await
    }

    async fn recent_visible_posts(&self, limit: usize) -> Result<Vec<Post>> {
        self.record("recent_visible_posts");
        self.inner.recent_visible_posts(limit).await
    }

    async fn visible_posts_before(
        &self,
        max_created_at: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        self.record("visible_posts_before");
        self.inner.visible_posts_before(max_created_at, limit).await
    }

    async fn posts_by_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Post>> {
        self.record("posts_by_user");
        self.inner.posts_by_user(user_id, limit).await
    }

    async fn post_by_id(&self, id: PostId) -> Result<Option<Post>> {
        self.record("post_by_id");
        self.inner.post_by_id(id).await
    }

    async fn post_ids(&self) -> Result<Vec<PostId>> {
        self.record("post_ids");
        self.inner.post_ids().await
    }

    async fn post_ids_by_user(&self, user_id: UserId) -> Result<Vec<PostId>> {
        self.record("post_ids_by_user");
        self.inner.post_ids_by_user(user_id).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<PostId> {
        self.record("insert_post");
        self.inner.insert_post(post).await
    }

    async fn comments_by_post(&self, post_id: PostId) -> Result<Vec<Comment>> {
        self.record("comments_by_post");
        self.inner.comments_by_post(post_id).await
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<CommentId> {
        self.record("insert_comment");
        self.inner.insert_comment(comment).await
    }

    async fn comment_count_by_user(&self, user_id: UserId) -> Result<usize> {
        self.record("comment_count_by_user");
        self.inner.comment_count_by_user(user_id).await
    }

    async fn comment_count_for_posts(&self, post_ids: &[PostId]) -> Result<usize> {
        self.record("comment_count_for_posts");
        self.inner.comment_count_for_posts(post_ids).await
    }

    async fn reset_to_baseline(&self, baseline: &Baseline) -> Result<()> {
        self.record("reset_to_baseline");
        self.inner.reset_to_baseline(baseline).await
    }
}

/// A backend that is never reachable.
pub struct FailingBackend;

#[async_trait]
impl CacheBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
        Err(Error::Transport("connection refused".to_string()))
    }

    async fn get_multi(&self, _keys: &[String]) -> Result<HashMap<String, Bytes>> {
        Err(Error::Transport("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: Bytes) -> Result<()> {
        Err(Error::Transport("connection refused".to_string()))
    }

    async fn compare_and_set(&self, _key: &str, _expected: &[u8], _value: Bytes) -> Result<bool> {
        Err(Error::Transport("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(Error::Transport("connection refused".to_string()))
    }

    async fn delete_all(&self) -> Result<()> {
        Err(Error::Transport("connection refused".to_string()))
    }
}

/// A coordinator over an in-process moka backend and a throwaway sled store.
pub struct Harness {
    _dir: TempDir,
    pub store: Arc<CountingStore>,
    pub backend: MokaBackend,
    pub coordinator: Arc<CacheCoordinator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(CacheOptions::default())
    }

    pub fn with_options(options: CacheOptions) -> Self {
        let dir = TempDir::new().unwrap();
        let sled = SledStore::open(dir.path().join("db"), 2).unwrap();
        let store = Arc::new(CountingStore::new(sled));
        let backend = MokaBackend::new_unbounded();
        let coordinator = Arc::new(CacheCoordinator::new(
            Arc::new(backend.clone()),
            store.clone(),
            options,
        ));
        Self {
            _dir: dir,
            store,
            backend,
            coordinator,
        }
    }

    /// Insert a user straight into the store, bypassing the cache.
    pub async fn seed_user(&self, name: &str) -> UserId {
        self.store
            .insert_user(&NewUser::new(name, "hash"))
            .await
            .unwrap()
    }

    pub async fn seed_post(&self, user_id: UserId, body: &str) -> PostId {
        self.store
            .insert_post(&NewPost::new(user_id, ImageMime::Jpeg, body))
            .await
            .unwrap()
    }

    pub async fn seed_comment(&self, post_id: PostId, user_id: UserId, text: &str) -> CommentId {
        self.store
            .insert_comment(&NewComment::new(post_id, user_id, text))
            .await
            .unwrap()
    }

    pub async fn cached(&self, key: &str) -> Option<Bytes> {
        self.backend.get(key).await.unwrap()
    }
}
