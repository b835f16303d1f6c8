use gramcache::CacheCoordinator;
use gramcache::domain::{PostView, User, UserId};
use shared::{Error, Result};
use std::sync::Arc;
use tracing::info;

const MIN_ACCOUNT_NAME_LEN: usize = 3;

/// A user's page: their latest posts and activity counters.
#[derive(Debug, Clone)]
pub struct Profile {
    pub user: User,
    pub posts: Vec<PostView>,
    pub post_count: usize,
    /// Comments this user wrote.
    pub comment_count: usize,
    /// Comments other people (or they) left on this user's posts.
    pub commented_count: usize,
}

#[derive(Clone)]
pub struct AccountUseCase {
    coordinator: Arc<CacheCoordinator>,
}

impl AccountUseCase {
    pub fn new(coordinator: Arc<CacheCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Register a new account. The password is expected already hashed.
    pub async fn register(&self, account_name: &str, password_hash: &str) -> Result<UserId> {
        validate_account_name(account_name)?;

        let store = self.coordinator.store();
        if store.account_name_exists(account_name).await? {
            return Err(Error::AccountNameTaken(account_name.to_string()));
        }

        let id = self
            .coordinator
            .users()
            .create(account_name, password_hash)
            .await?;
        info!("Registered account {} as user {}", account_name, id);
        Ok(id)
    }

    pub async fn profile(&self, account_name: &str, csrf_token: &str) -> Result<Option<Profile>> {
        let store = self.coordinator.store();
        let user = match store.find_user_by_account_name(account_name).await? {
            Some(user) if !user.is_deleted() => user,
            _ => return Ok(None),
        };

        let post_index = self.coordinator.post_index();
        let limit = self.coordinator.options().posts_per_page;
        let recent = post_index.posts_by_user(user.id, limit).await?;
        let posts = self
            .coordinator
            .aggregator()
            .assemble(recent, csrf_token, false)
            .await?;

        let comment_count = store.comment_count_by_user(user.id).await?;
        let post_ids = post_index.post_ids_by_user(user.id).await?;
        let commented_count = if post_ids.is_empty() {
            0
        } else {
            store.comment_count_for_posts(&post_ids).await?
        };

        Ok(Some(Profile {
            user,
            posts,
            post_count: post_ids.len(),
            comment_count,
            commented_count,
        }))
    }

    /// Resolve the user behind a session through the user cache.
    pub async fn session_user(&self, id: UserId) -> Result<Option<User>> {
        let mut users = self.coordinator.users().batch_get(&[id]).await?;
        Ok(users.remove(&id))
    }
}

fn validate_account_name(name: &str) -> Result<()> {
    let well_formed = name.chars().count() >= MIN_ACCOUNT_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !well_formed {
        return Err(Error::InvalidInput(format!(
            "account name must be at least {} of [0-9A-Za-z_], got '{}'",
            MIN_ACCOUNT_NAME_LEN, name
        )));
    }
    Ok(())
}
