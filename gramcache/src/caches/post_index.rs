use super::{decode, encode};
use crate::coordinator::CacheCoordinator;
use crate::domain::{NewPost, Post, PostId, UserId};
use crate::keys;
use chrono::{DateTime, Utc};
use shared::Result;
use tracing::debug;

/// The recent-posts page, cached as one opaque blob under `indexPosts`.
///
/// Nothing patches the blob: any change that could alter the page drops it
/// and the next reader rebuilds it from the store. The uncached post queries
/// also run under this domain's lock.
pub struct PostIndexCache<'a> {
    coordinator: &'a CacheCoordinator,
}

impl<'a> PostIndexCache<'a> {
    pub(crate) fn new(coordinator: &'a CacheCoordinator) -> Self {
        Self { coordinator }
    }

    /// Most recent visible posts, newest first.
    pub async fn get_recent(&self, limit: usize) -> Result<Vec<Post>> {
        let _guard = self.coordinator.locks().post_index.lock().await;

        if let Some(raw) = self.coordinator.backend_get(keys::INDEX_POSTS).await {
            return decode(keys::INDEX_POSTS, &raw);
        }

        debug!("post index miss, rebuilding from store (limit {})", limit);
        let posts = self.coordinator.store().recent_visible_posts(limit).await?;
        self.coordinator
            .backend_set(keys::INDEX_POSTS, encode(keys::INDEX_POSTS, &posts)?)
            .await;
        Ok(posts)
    }

    /// Drop the cached page. Returns whether an entry was removed.
    pub async fn invalidate(&self) -> bool {
        let _guard = self.coordinator.locks().post_index.lock().await;
        self.coordinator.backend_delete(keys::INDEX_POSTS).await
    }

    /// Insert a post and drop the cached page within one lock hold.
    pub async fn create_post(&self, post: NewPost) -> Result<PostId> {
        let _guard = self.coordinator.locks().post_index.lock().await;

        let id = self.coordinator.store().insert_post(&post).await?;
        self.coordinator.backend_delete(keys::INDEX_POSTS).await;

        debug!("created post {} by user {}", id, post.user_id);
        Ok(id)
    }

    pub async fn post_by_id(&self, id: PostId) -> Result<Option<Post>> {
        let _guard = self.coordinator.locks().post_index.lock().await;
        self.coordinator.store().post_by_id(id).await
    }

    pub async fn posts_by_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Post>> {
        let _guard = self.coordinator.locks().post_index.lock().await;
        self.coordinator.store().posts_by_user(user_id, limit).await
    }

    pub async fn post_ids_by_user(&self, user_id: UserId) -> Result<Vec<PostId>> {
        let _guard = self.coordinator.locks().post_index.lock().await;
        self.coordinator.store().post_ids_by_user(user_id).await
    }

    /// Older page of visible posts, for paging past the cached index.
    pub async fn visible_posts_before(
        &self,
        max_created_at: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let _guard = self.coordinator.locks().post_index.lock().await;
        self.coordinator
            .store()
            .visible_posts_before(max_created_at, limit)
            .await
    }
}
