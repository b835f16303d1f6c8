use chrono::{DateTime, Utc};
use gramcache::CacheCoordinator;
use gramcache::domain::{PostId, PostView};
use shared::Result;
use std::sync::Arc;

/// Read side of the timeline: front page, older pages and single posts.
#[derive(Clone)]
pub struct FeedUseCase {
    coordinator: Arc<CacheCoordinator>,
}

impl FeedUseCase {
    pub fn new(coordinator: Arc<CacheCoordinator>) -> Self {
        Self { coordinator }
    }

    pub async fn index(&self, csrf_token: &str) -> Result<Vec<PostView>> {
        let limit = self.coordinator.options().posts_per_page;
        let posts = self.coordinator.post_index().get_recent(limit).await?;
        self.coordinator
            .aggregator()
            .assemble(posts, csrf_token, false)
            .await
    }

    /// The page of posts created at or before `max_created_at`, newest first.
    pub async fn before(
        &self,
        max_created_at: DateTime<Utc>,
        csrf_token: &str,
    ) -> Result<Vec<PostView>> {
        let limit = self.coordinator.options().posts_per_page;
        let posts = self
            .coordinator
            .post_index()
            .visible_posts_before(max_created_at, limit)
            .await?;
        self.coordinator
            .aggregator()
            .assemble(posts, csrf_token, false)
            .await
    }

    /// One post with every comment. `None` when it does not exist or its
    /// author is banned.
    pub async fn post_detail(&self, id: PostId, csrf_token: &str) -> Result<Option<PostView>> {
        let Some(post) = self.coordinator.post_index().post_by_id(id).await? else {
            return Ok(None);
        };
        let mut views = self
            .coordinator
            .aggregator()
            .assemble(vec![post], csrf_token, true)
            .await?;
        Ok(views.pop())
    }
}
