//! Backend key namespace. These strings are shared with any other process
//! talking to the same cache node, so they must not change.

use crate::domain::{PostId, UserId};

pub const INDEX_POSTS: &str = "indexPosts";

pub fn user(id: UserId) -> String {
    format!("user:{id}")
}

pub fn comments(post_id: PostId) -> String {
    format!("comments:{post_id}")
}
