use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// How `invalidate_soft_delete` writes the flipped snapshot back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SoftDeletePolicy {
    /// Blind overwrite of whatever snapshot was read.
    #[default]
    Overwrite,
    /// Conditional write that only lands while the entry still holds the
    /// snapshot that was read; retried a few times, then the entry is evicted.
    CompareAndSwap,
}

impl FromStr for SoftDeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(SoftDeletePolicy::Overwrite),
            "cas" | "compare-and-swap" => Ok(SoftDeletePolicy::CompareAndSwap),
            other => Err(format!("unknown soft delete policy '{other}'")),
        }
    }
}

/// Lock granularity for the comment domain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommentLocking {
    /// One lock serializes comment traffic for every post.
    #[default]
    Shared,
    /// One lock per post id, created on demand.
    PerPost,
}

impl FromStr for CommentLocking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(CommentLocking::Shared),
            "per-post" | "per_post" => Ok(CommentLocking::PerPost),
            other => Err(format!("unknown comment locking '{other}'")),
        }
    }
}

/// Knobs consumed by the cache coordinator.
#[derive(Clone, Copy, Debug)]
pub struct CacheOptions {
    pub posts_per_page: usize,
    pub soft_delete: SoftDeletePolicy,
    pub comment_locking: CommentLocking,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            posts_per_page: Config::DEFAULT_POSTS_PER_PAGE,
            soft_delete: SoftDeletePolicy::default(),
            comment_locking: CommentLocking::default(),
        }
    }
}

pub struct Config {
    /// Address of the cache node the application talks to.
    pub cache_addr: String,
    pub cache_timeout: Duration,
    pub data_dir: String,
    pub store_max_connections: usize,
    pub node_host: String,
    pub node_port: u16,
    pub cache: CacheOptions,
}

impl Config {
    const DEFAULT_CACHE_ADDR: &str = "127.0.0.1:11311";
    const DEFAULT_CACHE_TIMEOUT_MS: u64 = 300;
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_STORE_MAX_CONNECTIONS: usize = 2;
    const DEFAULT_NODE_PORT: u16 = 11311;
    pub const DEFAULT_POSTS_PER_PAGE: usize = 20;

    pub fn from_env() -> Self {
        let cache_timeout_ms = std::env::var("GRAMCACHE_CACHE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(Self::DEFAULT_CACHE_TIMEOUT_MS);
        let store_max_connections = std::env::var("GRAMCACHE_STORE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(Self::DEFAULT_STORE_MAX_CONNECTIONS);
        let node_port = std::env::var("GRAMCACHE_NODE_PORT")
            .unwrap_or_else(|_| Self::DEFAULT_NODE_PORT.to_string())
            .parse::<u16>()
            .unwrap_or(Self::DEFAULT_NODE_PORT);
        let posts_per_page = std::env::var("GRAMCACHE_POSTS_PER_PAGE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(Self::DEFAULT_POSTS_PER_PAGE);

        Self {
            cache_addr: std::env::var("GRAMCACHE_CACHE_ADDR")
                .unwrap_or_else(|_| Self::DEFAULT_CACHE_ADDR.to_string()),
            cache_timeout: Duration::from_millis(cache_timeout_ms),
            data_dir: std::env::var("GRAMCACHE_DATA_DIR")
                .unwrap_or_else(|_| Self::DEFAULT_DATA_DIR.to_string()),
            store_max_connections,
            node_host: std::env::var("GRAMCACHE_NODE_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            node_port,
            cache: CacheOptions {
                posts_per_page,
                soft_delete: parse_or_default("GRAMCACHE_SOFT_DELETE"),
                comment_locking: parse_or_default("GRAMCACHE_COMMENT_LOCKING"),
            },
        }
    }

    pub fn node_bind_addr(&self) -> String {
        format!("{}:{}", self.node_host, self.node_port)
    }
}

fn parse_or_default<T>(var: &str) -> T
where
    T: FromStr<Err = String> + Default,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("{var}: {e}, falling back to default");
            T::default()
        }),
        Err(_) => T::default(),
    }
}
