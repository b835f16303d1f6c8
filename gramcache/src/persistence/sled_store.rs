use crate::domain::{
    Baseline, Comment, CommentId, NewComment, NewPost, NewUser, Post, PostId, User, UserId,
};
use crate::ports::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::{Error, Result};
use sled::{Db, Tree};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::info;

const USERS_TREE: &str = "users";
const USERS_BY_ACCOUNT_TREE: &str = "users_by_account";
const POSTS_TREE: &str = "posts";
const COMMENTS_TREE: &str = "comments";
const SEQUENCES_TREE: &str = "sequences";

/// Sled-backed store with one tree per table.
///
/// Comments are keyed by `(post_id, comment_id)` so a prefix scan returns a
/// post's comments in insertion order. Concurrent queries are capped by a
/// small semaphore, mirroring a tiny connection pool.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    connections: Arc<Semaphore>,
}

impl SledStore {
    /// Open (or create) the store at `path`, allowing `max_connections`
    /// queries in flight at once.
    pub fn open(path: impl AsRef<Path>, max_connections: usize) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Store(format!("Failed to create directory: {}", e)))?;
        }

        let db = sled::open(path)?;
        info!("Opened sled store with {} connection(s)", max_connections);
        Ok(Self {
            db,
            connections: Arc::new(Semaphore::new(max_connections.max(1))),
        })
    }

    async fn connection(&self) -> Result<SemaphorePermit<'_>> {
        self.connections
            .acquire()
            .await
            .map_err(|_| Error::Store("connection pool closed".to_string()))
    }

    fn tree(&self, name: &str) -> Result<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    fn next_id(&self, table: &str) -> Result<u64> {
        let sequences = self.tree(SEQUENCES_TREE)?;
        let next = sequences.update_and_fetch(table.as_bytes(), |old| {
            let current = old.map(decode_u64).unwrap_or(0);
            Some((current + 1).to_be_bytes().to_vec())
        })?;
        next.map(|v| decode_u64(&v))
            .ok_or_else(|| Error::Store(format!("sequence '{}' vanished", table)))
    }

    fn scan<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let tree = self.tree(name)?;
        let mut rows = Vec::new();
        for item in tree.iter() {
            let (_, value) = item?;
            rows.push(decode_row(&value)?);
        }
        Ok(rows)
    }

    fn deleted_user_ids(&self) -> Result<HashSet<UserId>> {
        Ok(self
            .scan::<User>(USERS_TREE)?
            .into_iter()
            .filter(|u| u.del_flg)
            .map(|u| u.id)
            .collect())
    }

    fn newest_posts<F>(&self, limit: usize, keep: F) -> Result<Vec<Post>>
    where
        F: Fn(&Post) -> bool,
    {
        let mut posts: Vec<Post> = self
            .scan::<Post>(POSTS_TREE)?
            .into_iter()
            .filter(|p| keep(p))
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts.truncate(limit);
        Ok(posts)
    }

    fn comment_count_on_post(&self, post_id: PostId) -> Result<usize> {
        let comments = self.tree(COMMENTS_TREE)?;
        let mut count = 0;
        for item in comments.scan_prefix(post_id.to_be_bytes()) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl Store for SledStore {
    async fn users_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>> {
        let _conn = self.connection().await?;
        let users = self.tree(USERS_TREE)?;

        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(raw) = users.get(id.to_be_bytes())? {
                found.push(decode_row(&raw)?);
            }
        }
        Ok(found)
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        let _conn = self.connection().await?;
        self.scan(USERS_TREE)
    }

    async fn find_user_by_account_name(&self, account_name: &str) -> Result<Option<User>> {
        let _conn = self.connection().await?;
        let by_account = self.tree(USERS_BY_ACCOUNT_TREE)?;
        let users = self.tree(USERS_TREE)?;

        if let Some(id) = by_account.get(account_name.as_bytes())? {
            if let Some(raw) = users.get(&id)? {
                return Ok(Some(decode_row(&raw)?));
            }
        }
        Ok(None)
    }

    async fn account_name_exists(&self, account_name: &str) -> Result<bool> {
        let _conn = self.connection().await?;
        let by_account = self.tree(USERS_BY_ACCOUNT_TREE)?;
        Ok(by_account.contains_key(account_name.as_bytes())?)
    }

    async fn insert_user(&self, user: &NewUser) -> Result<UserId> {
        let _conn = self.connection().await?;
        let users = self.tree(USERS_TREE)?;
        let by_account = self.tree(USERS_BY_ACCOUNT_TREE)?;

        let id = self.next_id(USERS_TREE)?;

        // The account index doubles as the unique constraint.
        let claimed = by_account.compare_and_swap(
            user.account_name.as_bytes(),
            None as Option<&[u8]>,
            Some(&id.to_be_bytes()[..]),
        )?;
        if claimed.is_err() {
            return Err(Error::AccountNameTaken(user.account_name.clone()));
        }

        let row = user.clone().into_user(id);
        users.insert(id.to_be_bytes(), encode_row(&row)?)?;
        Ok(id)
    }

    async fn set_user_deleted(&self, id: UserId, deleted: bool) -> Result<bool> {
        let _conn = self.connection().await?;
        let users = self.tree(USERS_TREE)?;

        let Some(raw) = users.get(id.to_be_bytes())? else {
            return Ok(false);
        };
        let mut user: User = decode_row(&raw)?;
        user.del_flg = deleted;
        users.insert(id.to_be_bytes(), encode_row(&user)?)?;
        Ok(true)
    }

    async fn active_regular_users(&self) -> Result<Vec<User>> {
        let _conn = self.connection().await?;
        let mut users: Vec<User> = self
            .scan::<User>(USERS_TREE)?
            .into_iter()
            .filter(|u| !u.authority && !u.del_flg)
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users)
    }

    async fn recent_visible_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let _conn = self.connection().await?;
        let deleted = self.deleted_user_ids()?;
        self.newest_posts(limit, |p| !deleted.contains(&p.user_id))
    }

    async fn visible_posts_before(
        &self,
        max_created_at: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let _conn = self.connection().await?;
        let deleted = self.deleted_user_ids()?;
        self.newest_posts(limit, |p| {
            p.created_at <= max_created_at && !deleted.contains(&p.user_id)
        })
    }

    async fn posts_by_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Post>> {
        let _conn = self.connection().await?;
        self.newest_posts(limit, |p| p.user_id == user_id)
    }

    async fn post_by_id(&self, id: PostId) -> Result<Option<Post>> {
        let _conn = self.connection().await?;
        let posts = self.tree(POSTS_TREE)?;
        match posts.get(id.to_be_bytes())? {
            Some(raw) => Ok(Some(decode_row(&raw)?)),
            None => Ok(None),
        }
    }

    async fn post_ids(&self) -> Result<Vec<PostId>> {
        let _conn = self.connection().await?;
        let posts = self.tree(POSTS_TREE)?;
        let mut ids = Vec::new();
        for key in posts.iter().keys() {
            ids.push(decode_u64(&key?));
        }
        Ok(ids)
    }

    async fn post_ids_by_user(&self, user_id: UserId) -> Result<Vec<PostId>> {
        let _conn = self.connection().await?;
        Ok(self
            .scan::<Post>(POSTS_TREE)?
            .into_iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.id)
            .collect())
    }

    async fn insert_post(&self, post: &NewPost) -> Result<PostId> {
        let _conn = self.connection().await?;
        let posts = self.tree(POSTS_TREE)?;

        let id = self.next_id(POSTS_TREE)?;
        let row = post.clone().into_post(id);
        posts.insert(id.to_be_bytes(), encode_row(&row)?)?;
        Ok(id)
    }

    async fn comments_by_post(&self, post_id: PostId) -> Result<Vec<Comment>> {
        let _conn = self.connection().await?;
        let tree = self.tree(COMMENTS_TREE)?;

        let mut comments: Vec<Comment> = Vec::new();
        for item in tree.scan_prefix(post_id.to_be_bytes()) {
            let (_, raw) = item?;
            comments.push(decode_row(&raw)?);
        }
        // Stable, so rows sharing a timestamp keep insertion order.
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<CommentId> {
        let _conn = self.connection().await?;
        let tree = self.tree(COMMENTS_TREE)?;

        let id = self.next_id(COMMENTS_TREE)?;
        let row = comment.clone().into_comment(id);
        tree.insert(comment_key(row.post_id, id), encode_row(&row)?)?;
        Ok(id)
    }

    async fn comment_count_by_user(&self, user_id: UserId) -> Result<usize> {
        let _conn = self.connection().await?;
        Ok(self
            .scan::<Comment>(COMMENTS_TREE)?
            .iter()
            .filter(|c| c.user_id == user_id)
            .count())
    }

    async fn comment_count_for_posts(&self, post_ids: &[PostId]) -> Result<usize> {
        let _conn = self.connection().await?;
        let mut total = 0;
        for post_id in post_ids {
            total += self.comment_count_on_post(*post_id)?;
        }
        Ok(total)
    }

    async fn reset_to_baseline(&self, baseline: &Baseline) -> Result<()> {
        let _conn = self.connection().await?;
        let users = self.tree(USERS_TREE)?;
        let by_account = self.tree(USERS_BY_ACCOUNT_TREE)?;
        let posts = self.tree(POSTS_TREE)?;
        let comments = self.tree(COMMENTS_TREE)?;

        for user in self.scan::<User>(USERS_TREE)? {
            if user.id > baseline.max_user_id {
                users.remove(user.id.to_be_bytes())?;
                by_account.remove(user.account_name.as_bytes())?;
                continue;
            }
            let del_flg = baseline.starts_banned(user.id);
            if user.del_flg != del_flg {
                let restored = User { del_flg, ..user };
                users.insert(restored.id.to_be_bytes(), encode_row(&restored)?)?;
            }
        }

        for post in self.scan::<Post>(POSTS_TREE)? {
            if post.id > baseline.max_post_id {
                posts.remove(post.id.to_be_bytes())?;
            }
        }

        for comment in self.scan::<Comment>(COMMENTS_TREE)? {
            if comment.id > baseline.max_comment_id {
                comments.remove(comment_key(comment.post_id, comment.id))?;
            }
        }

        self.db.flush_async().await?;
        info!(
            "Store reset to baseline (users <= {}, posts <= {}, comments <= {})",
            baseline.max_user_id, baseline.max_post_id, baseline.max_comment_id
        );
        Ok(())
    }
}

fn comment_key(post_id: PostId, comment_id: CommentId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&post_id.to_be_bytes());
    key[8..].copy_from_slice(&comment_id.to_be_bytes());
    key
}

fn decode_u64(raw: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = raw.len().min(8);
    buf[8 - n..].copy_from_slice(&raw[raw.len() - n..]);
    u64::from_be_bytes(buf)
}

fn encode_row<T: Serialize>(row: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(row).map_err(|e| Error::Store(format!("Failed to encode row: {}", e)))
}

fn decode_row<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw).map_err(|e| Error::Store(format!("Failed to decode row: {}", e)))
}
