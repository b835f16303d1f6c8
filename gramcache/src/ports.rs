#![deny(clippy::all)]

use crate::domain::{
    Baseline, Comment, CommentId, NewComment, NewPost, NewUser, Post, PostId, User, UserId,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use shared::Result;
use std::collections::HashMap;

// Ports are the pluggable seams between the caches and the outside world

/// Port for the network key-value cache sitting in front of the store.
/// Entries never expire; every call is bounded by the implementation's timeout.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Only keys that are present come back; absent keys are simply omitted.
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Bytes>>;

    async fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Replace the entry only while it still holds exactly `expected`.
    /// Returns false, writing nothing, when it changed or is gone.
    async fn compare_and_set(&self, key: &str, expected: &[u8], value: Bytes) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<bool>;

    async fn delete_all(&self) -> Result<()>;
}

/// Port for the authoritative store
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Batched `WHERE id IN (...)` lookup; unknown ids are skipped.
    async fn users_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>>;

    async fn all_users(&self) -> Result<Vec<User>>;

    async fn find_user_by_account_name(&self, account_name: &str) -> Result<Option<User>>;

    async fn account_name_exists(&self, account_name: &str) -> Result<bool>;

    async fn insert_user(&self, user: &NewUser) -> Result<UserId>;

    /// Returns false when no row has that id.
    async fn set_user_deleted(&self, id: UserId, deleted: bool) -> Result<bool>;

    /// Non-admin, non-deleted users, newest first.
    async fn active_regular_users(&self) -> Result<Vec<User>>;

    /// Newest posts whose author is not deleted.
    async fn recent_visible_posts(&self, limit: usize) -> Result<Vec<Post>>;

    async fn visible_posts_before(
        &self,
        max_created_at: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Post>>;

    async fn posts_by_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Post>>;

    async fn post_by_id(&self, id: PostId) -> Result<Option<Post>>;

    async fn post_ids(&self) -> Result<Vec<PostId>>;

    async fn post_ids_by_user(&self, user_id: UserId) -> Result<Vec<PostId>>;

    async fn insert_post(&self, post: &NewPost) -> Result<PostId>;

    /// All comments on a post, oldest first.
    async fn comments_by_post(&self, post_id: PostId) -> Result<Vec<Comment>>;

    async fn insert_comment(&self, comment: &NewComment) -> Result<CommentId>;

    async fn comment_count_by_user(&self, user_id: UserId) -> Result<usize>;

    async fn comment_count_for_posts(&self, post_ids: &[PostId]) -> Result<usize>;

    /// Drop rows above the baseline watermarks and restore the ban flags.
    async fn reset_to_baseline(&self, baseline: &Baseline) -> Result<()>;
}
