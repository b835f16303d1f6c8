use super::{decode, encode};
use crate::coordinator::CacheCoordinator;
use crate::domain::{Comment, CommentId, NewComment, PostId, UserId};
use crate::keys;
use shared::Result;
use tracing::debug;

/// Per-post comment lists, oldest first, under `comments:<postId>`.
pub struct CommentCache<'a> {
    coordinator: &'a CacheCoordinator,
}

impl<'a> CommentCache<'a> {
    pub(crate) fn new(coordinator: &'a CacheCoordinator) -> Self {
        Self { coordinator }
    }

    /// All comments for a post in ascending creation order.
    pub async fn get_by_post(&self, post_id: PostId) -> Result<Vec<Comment>> {
        let _guard = self.coordinator.locks().comments.lock(post_id).await;
        let key = keys::comments(post_id);

        if let Some(raw) = self.coordinator.backend_get(&key).await {
            return decode(&key, &raw);
        }

        let comments = self.coordinator.store().comments_by_post(post_id).await?;
        self.coordinator.backend_set(&key, encode(&key, &comments)?).await;
        Ok(comments)
    }

    /// Persist a comment, then append it to the cached list if there is one.
    ///
    /// When the post has no cached list the cache is left cold; the next
    /// `get_by_post` rebuilds it from the store, which already has the row.
    pub async fn append(&self, post_id: PostId, user_id: UserId, text: &str) -> Result<CommentId> {
        let _guard = self.coordinator.locks().comments.lock(post_id).await;
        let key = keys::comments(post_id);

        let new_comment = NewComment::new(post_id, user_id, text);
        let id = self.coordinator.store().insert_comment(&new_comment).await?;

        let Some(raw) = self.coordinator.backend_get(&key).await else {
            debug!("no cached comments for post {}, leaving cold", post_id);
            return Ok(id);
        };

        let mut comments: Vec<Comment> = decode(&key, &raw)?;
        comments.push(new_comment.into_comment(id));
        self.coordinator.backend_set(&key, encode(&key, &comments)?).await;
        Ok(id)
    }

    /// Build the cached list for every post in the store.
    pub async fn warm(&self) -> Result<usize> {
        let post_ids = self.coordinator.store().post_ids().await?;
        for post_id in &post_ids {
            self.get_by_post(*post_id).await?;
        }
        Ok(post_ids.len())
    }
}
