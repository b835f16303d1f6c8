use super::{decode, encode};
use crate::coordinator::CacheCoordinator;
use crate::domain::{NewUser, User, UserId};
use crate::keys;
use shared::config::SoftDeletePolicy;
use shared::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

const MAX_CAS_ATTEMPTS: usize = 3;

/// Batch read-through cache for user records, one backend entry per user.
///
/// Every operation holds the user-domain lock for its whole duration.
pub struct UserCache<'a> {
    coordinator: &'a CacheCoordinator,
}

impl<'a> UserCache<'a> {
    pub(crate) fn new(coordinator: &'a CacheCoordinator) -> Self {
        Self { coordinator }
    }

    /// Look up many users at once.
    ///
    /// One multi-get goes to the backend; whatever is missing (or everything,
    /// if the multi-get fails) is fetched from the store in one batched query
    /// and cached entry by entry. Ids that exist nowhere are left out of the
    /// result.
    pub async fn batch_get(&self, ids: &[UserId]) -> Result<HashMap<UserId, User>> {
        let wanted: BTreeSet<UserId> = ids.iter().copied().collect();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }

        let _guard = self.coordinator.locks().users.lock().await;

        let keys: Vec<String> = wanted.iter().map(|id| keys::user(*id)).collect();
        let hits = self.coordinator.backend_get_multi(&keys).await;

        let mut users = HashMap::with_capacity(wanted.len());
        let mut misses = Vec::new();
        for (id, key) in wanted.iter().zip(&keys) {
            match hits.get(key) {
                Some(raw) => {
                    let user: User = decode(key, raw)?;
                    if user.id != *id {
                        return Err(Error::corruption(
                            key.as_str(),
                            format!("entry holds user {}", user.id),
                        ));
                    }
                    users.insert(*id, user);
                }
                None => misses.push(*id),
            }
        }

        if !misses.is_empty() {
            debug!("user cache miss for {} of {} id(s)", misses.len(), wanted.len());
            let rows = self.coordinator.store().users_by_ids(&misses).await?;
            for user in rows {
                if !wanted.contains(&user.id) {
                    continue;
                }
                let key = keys::user(user.id);
                self.coordinator.backend_set(&key, encode(&key, &user)?).await;
                users.insert(user.id, user);
            }
        }

        Ok(users)
    }

    /// Insert a user and cache the full record before returning, so an
    /// immediate `batch_get` of the new id is a cache hit.
    pub async fn create(&self, account_name: &str, password_hash: &str) -> Result<UserId> {
        self.insert(NewUser::new(account_name, password_hash)).await
    }

    pub async fn insert(&self, new_user: NewUser) -> Result<UserId> {
        let _guard = self.coordinator.locks().users.lock().await;

        let id = self.coordinator.store().insert_user(&new_user).await?;
        let user = new_user.into_user(id);
        let key = keys::user(id);
        self.coordinator.backend_set(&key, encode(&key, &user)?).await;

        debug!("created user {} ({})", id, user.account_name);
        Ok(id)
    }

    /// Flip the deletion flag on the cached snapshot of `id`.
    ///
    /// An absent entry is left absent; the store is not consulted. Returns
    /// whether a cached snapshot was rewritten.
    pub async fn invalidate_soft_delete(&self, id: UserId) -> Result<bool> {
        let _guard = self.coordinator.locks().users.lock().await;
        let key = keys::user(id);

        match self.coordinator.options().soft_delete {
            SoftDeletePolicy::Overwrite => {
                let Some(raw) = self.coordinator.backend_get(&key).await else {
                    return Ok(false);
                };
                let mut user: User = decode(&key, &raw)?;
                user.del_flg = true;
                // Blind write: a newer snapshot stored by another process is lost.
                self.coordinator.backend_set(&key, encode(&key, &user)?).await;
                Ok(true)
            }
            SoftDeletePolicy::CompareAndSwap => self.soft_delete_checked(&key).await,
        }
    }

    async fn soft_delete_checked(&self, key: &str) -> Result<bool> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let Some(seen) = self.coordinator.backend_get(key).await else {
                return Ok(false);
            };
            let mut user: User = decode(key, &seen)?;
            user.del_flg = true;
            let updated = encode(key, &user)?;

            if self
                .coordinator
                .backend_compare_and_set(key, &seen, updated)
                .await
            {
                return Ok(true);
            }
            debug!("'{}' changed during soft delete (attempt {})", key, attempt);
        }

        // Still contended: drop the entry so the next read comes from the store.
        warn!(
            "giving up soft delete of '{}' after {} attempts, evicting",
            key, MAX_CAS_ATTEMPTS
        );
        self.coordinator.backend_delete(key).await;
        Ok(false)
    }

    /// Load every user from the store into the cache. Returns how many were cached.
    pub async fn warm(&self) -> Result<usize> {
        let _guard = self.coordinator.locks().users.lock().await;

        let users = self.coordinator.store().all_users().await?;
        for user in &users {
            let key = keys::user(user.id);
            self.coordinator.backend_set(&key, encode(&key, user)?).await;
        }
        Ok(users.len())
    }
}
