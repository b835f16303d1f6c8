use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type PostId = u64;
pub type CommentId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub account_name: String,
    pub passhash: String,
    pub authority: bool,
    pub del_flg: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.authority
    }

    pub fn is_deleted(&self) -> bool {
        self.del_flg
    }
}

/// A user row before the store has assigned it an id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub account_name: String,
    pub passhash: String,
    pub authority: bool,
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    pub fn new(account_name: impl Into<String>, passhash: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            passhash: passhash.into(),
            authority: false,
            created_at: Utc::now(),
        }
    }

    pub fn admin(mut self) -> Self {
        self.authority = true;
        self
    }

    pub fn into_user(self, id: UserId) -> User {
        User {
            id,
            account_name: self.account_name,
            passhash: self.passhash,
            authority: self.authority,
            del_flg: false,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub body: String,
    pub mime: String,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Public path of the image attached to this post.
    pub fn image_path(&self) -> String {
        let ext = ImageMime::from_mime(&self.mime)
            .map(ImageMime::extension)
            .unwrap_or("");
        format!("/image/{}{}", self.id, ext)
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: UserId,
    pub body: String,
    pub mime: ImageMime,
    pub created_at: DateTime<Utc>,
}

impl NewPost {
    pub fn new(user_id: UserId, mime: ImageMime, body: impl Into<String>) -> Self {
        Self {
            user_id,
            body: body.into(),
            mime,
            created_at: Utc::now(),
        }
    }

    pub fn into_post(self, id: PostId) -> Post {
        Post {
            id,
            user_id: self.user_id,
            body: self.body,
            mime: self.mime.as_str().to_string(),
            created_at: self.created_at,
        }
    }
}

/// Image types a post may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
    Jpeg,
    Png,
    Gif,
}

impl ImageMime {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(ImageMime::Jpeg),
            "image/png" => Some(ImageMime::Png),
            "image/gif" => Some(ImageMime::Gif),
            _ => None,
        }
    }

    /// Loose match on an upload's Content-Type header.
    pub fn sniff(content_type: &str) -> Option<Self> {
        if content_type.contains("jpeg") {
            Some(ImageMime::Jpeg)
        } else if content_type.contains("png") {
            Some(ImageMime::Png)
        } else if content_type.contains("gif") {
            Some(ImageMime::Gif)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Gif => "image/gif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageMime::Jpeg => ".jpeg",
            ImageMime::Png => ".png",
            ImageMime::Gif => ".gif",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub user_id: UserId,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: PostId,
    pub user_id: UserId,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl NewComment {
    pub fn new(post_id: PostId, user_id: UserId, comment: impl Into<String>) -> Self {
        Self {
            post_id,
            user_id,
            comment: comment.into(),
            created_at: Utc::now(),
        }
    }

    pub fn into_comment(self, id: CommentId) -> Comment {
        Comment {
            id,
            post_id: self.post_id,
            user_id: self.user_id,
            comment: self.comment,
            created_at: self.created_at,
        }
    }
}

/// A comment together with its author snapshot, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentView {
    pub comment: Comment,
    pub user: Option<User>,
}

/// A post with its derived fields filled in by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostView {
    pub post: Post,
    pub user: User,
    pub comments: Vec<CommentView>,
    pub comment_count: usize,
    pub csrf_token: String,
}

/// Row-id watermarks the store is trimmed back to on initialize.
#[derive(Debug, Clone, Copy)]
pub struct Baseline {
    pub max_user_id: UserId,
    pub max_post_id: PostId,
    pub max_comment_id: CommentId,
    /// Every user whose id is a multiple of this starts out banned.
    pub ban_every: Option<u64>,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            max_user_id: 1000,
            max_post_id: 10_000,
            max_comment_id: 100_000,
            ban_every: Some(50),
        }
    }
}

impl Baseline {
    pub fn starts_banned(&self, id: UserId) -> bool {
        matches!(self.ban_every, Some(n) if n > 0 && id % n == 0)
    }
}
