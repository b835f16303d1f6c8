//! Use cases of the photo-sharing app, expressed over the cache layer.

pub mod usecases;

use cache_node::CacheNodeClient;
use gramcache::domain::Baseline;
use gramcache::{CacheBackend, CacheCoordinator, SledStore, Store};
use shared::Result;
use shared::config::{CacheOptions, Config};
use std::sync::Arc;
use tracing::{info, warn};
use usecases::{AccountUseCase, AdminUseCase, FeedUseCase, PostUseCase};

#[derive(Clone)]
pub struct Application {
    coordinator: Arc<CacheCoordinator>,
    pub feed: FeedUseCase,
    pub accounts: AccountUseCase,
    pub posts: PostUseCase,
    pub admin: AdminUseCase,
}

impl Application {
    pub fn new(coordinator: Arc<CacheCoordinator>) -> Self {
        Self {
            feed: FeedUseCase::new(coordinator.clone()),
            accounts: AccountUseCase::new(coordinator.clone()),
            posts: PostUseCase::new(coordinator.clone()),
            admin: AdminUseCase::new(coordinator.clone()),
            coordinator,
        }
    }

    /// Purge the backend and build the coordinator. Runs once per process.
    ///
    /// An unreachable backend is not fatal: every read falls back to the store.
    pub async fn bootstrap(
        backend: Arc<dyn CacheBackend>,
        store: Arc<dyn Store>,
        options: CacheOptions,
    ) -> Self {
        if let Err(e) = backend.delete_all().await {
            warn!("Could not purge cache backend at startup: {}", e);
        }
        Self::new(Arc::new(CacheCoordinator::new(backend, store, options)))
    }

    /// Open the sled store and connect to the cache node named in `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = SledStore::open(&config.data_dir, config.store_max_connections)?;
        let backend = CacheNodeClient::new(config.cache_addr.clone(), config.cache_timeout);
        info!(
            "Using store at {} and cache node at {}",
            config.data_dir,
            backend.addr()
        );

        Ok(Self::bootstrap(Arc::new(backend), Arc::new(store), config.cache).await)
    }

    /// Reset the store to its baseline and rebuild the caches from it.
    pub async fn initialize(&self) -> Result<()> {
        self.initialize_to(&Baseline::default()).await
    }

    /// Like [`Application::initialize`], with explicit watermarks.
    ///
    /// Every backend entry is dropped before warming: rows trimmed from the
    /// store may still be cached under `user:` or `comments:` keys.
    pub async fn initialize_to(&self, baseline: &Baseline) -> Result<()> {
        self.coordinator.store().reset_to_baseline(baseline).await?;
        if let Err(e) = self.coordinator.purge().await {
            warn!("Could not purge cache backend during initialize: {}", e);
        }

        let users = self.coordinator.users().warm().await?;
        let posts = self.coordinator.comments().warm().await?;
        info!("Initialized: cached {} user(s), comments for {} post(s)", users, posts);
        Ok(())
    }

    pub fn coordinator(&self) -> &Arc<CacheCoordinator> {
        &self.coordinator
    }
}
