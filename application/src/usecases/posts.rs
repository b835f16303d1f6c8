use gramcache::CacheCoordinator;
use gramcache::domain::{CommentId, ImageMime, NewPost, PostId, UserId};
use shared::{Error, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct PostUseCase {
    coordinator: Arc<CacheCoordinator>,
}

impl PostUseCase {
    pub fn new(coordinator: Arc<CacheCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Create a post from an upload's Content-Type. Only jpeg, png and gif
    /// are accepted.
    pub async fn create(&self, user_id: UserId, content_type: &str, body: &str) -> Result<PostId> {
        let mime = ImageMime::sniff(content_type).ok_or_else(|| {
            Error::InvalidInput(format!("unsupported image type '{}'", content_type))
        })?;

        self.coordinator
            .post_index()
            .create_post(NewPost::new(user_id, mime, body))
            .await
    }

    pub async fn comment(&self, post_id: PostId, user_id: UserId, text: &str) -> Result<CommentId> {
        self.coordinator
            .comments()
            .append(post_id, user_id, text)
            .await
    }
}
