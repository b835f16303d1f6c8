use gramcache::CacheCoordinator;
use gramcache::domain::{User, UserId};
use shared::Result;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AdminUseCase {
    coordinator: Arc<CacheCoordinator>,
}

impl AdminUseCase {
    pub fn new(coordinator: Arc<CacheCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Ban users: flag them in the store, patch their cached snapshots, then
    /// drop the front page so their posts disappear from it.
    ///
    /// Returns how many ids matched a user.
    pub async fn ban(&self, ids: &[UserId]) -> Result<usize> {
        let users = self.coordinator.users();
        let mut banned = 0;
        for &id in ids {
            if !self.coordinator.store().set_user_deleted(id, true).await? {
                warn!("Ban requested for unknown user {}", id);
                continue;
            }
            users.invalidate_soft_delete(id).await?;
            banned += 1;
        }

        self.coordinator.post_index().invalidate().await;
        info!("Banned {} of {} user(s)", banned, ids.len());
        Ok(banned)
    }

    pub async fn active_users(&self) -> Result<Vec<User>> {
        self.coordinator.store().active_regular_users().await
    }
}
