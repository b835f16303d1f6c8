use crate::coordinator::CacheCoordinator;
use crate::domain::{CommentView, Post, PostView, UserId};
use shared::Result;
use tracing::debug;

/// Comments shown under a post in list views.
pub const PREVIEW_COMMENTS: usize = 3;

/// Turns raw posts into view-ready ones: comments, authors and counts.
pub struct Aggregator<'a> {
    coordinator: &'a CacheCoordinator,
}

impl<'a> Aggregator<'a> {
    pub(crate) fn new(coordinator: &'a CacheCoordinator) -> Self {
        Self { coordinator }
    }

    /// Assemble candidate posts in order until a page is full.
    ///
    /// Each post resolves its own comments and then its own authors in a
    /// separate user batch. Posts by deleted or unknown authors are dropped
    /// only after those fetches.
    pub async fn assemble(
        &self,
        posts: Vec<Post>,
        csrf_token: &str,
        include_all_comments: bool,
    ) -> Result<Vec<PostView>> {
        let page_size = self.coordinator.options().posts_per_page;
        let comment_cache = self.coordinator.comments();
        let user_cache = self.coordinator.users();

        let mut views = Vec::with_capacity(posts.len().min(page_size));
        for post in posts {
            let mut comments = comment_cache.get_by_post(post.id).await?;
            let comment_count = comments.len();
            if !include_all_comments && comment_count > PREVIEW_COMMENTS {
                comments.drain(..comment_count - PREVIEW_COMMENTS);
            }

            let mut author_ids: Vec<UserId> = Vec::with_capacity(comments.len() + 1);
            author_ids.push(post.user_id);
            author_ids.extend(comments.iter().map(|c| c.user_id));
            let users = user_cache.batch_get(&author_ids).await?;

            // A missing author hides the post just like a banned one, rather
            // than rendering it with an empty author.
            let Some(author) = users.get(&post.user_id).cloned() else {
                debug!("post {} has no resolvable author {}", post.id, post.user_id);
                continue;
            };
            if author.is_deleted() {
                continue;
            }

            let comments = comments
                .into_iter()
                .map(|comment| CommentView {
                    user: users.get(&comment.user_id).cloned(),
                    comment,
                })
                .collect();

            views.push(PostView {
                post,
                user: author,
                comments,
                comment_count,
                csrf_token: csrf_token.to_string(),
            });
            if views.len() >= page_size {
                break;
            }
        }

        Ok(views)
    }
}
