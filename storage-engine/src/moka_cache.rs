use async_trait::async_trait;
use bytes::Bytes;
use gramcache::ports::CacheBackend;
use moka::future::Cache;
use shared::Result;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Moka-based key-value backend
/// Entries never expire; an optional entry bound lets moka evict under pressure.
/// Writes are serialized so `compare_and_set` cannot interleave with another write.
#[derive(Clone)]
pub struct MokaBackend {
    cache: Cache<String, Bytes>,
    writes: Arc<Mutex<()>>,
}

impl MokaBackend {
    /// Create an unbounded backend
    pub fn new_unbounded() -> Self {
        Self {
            cache: Cache::builder().build(),
            writes: Arc::default(),
        }
    }

    /// Create a named backend, optionally bounded by entry count
    pub fn new(name: &str, max_entries: Option<u64>) -> Self {
        let mut builder = Cache::builder().name(name);

        if let Some(capacity) = max_entries {
            builder = builder.max_capacity(capacity);
        }

        Self {
            cache: builder.build(),
            writes: Arc::default(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MokaBackend {
    fn default() -> Self {
        Self::new_unbounded()
    }
}

#[async_trait]
impl CacheBackend for MokaBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.cache.get(key).await)
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Bytes>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.cache.get(key).await {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let _write = self.writes.lock().await;
        self.cache.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn compare_and_set(&self, key: &str, expected: &[u8], value: Bytes) -> Result<bool> {
        let _write = self.writes.lock().await;
        match self.cache.get(key).await {
            Some(current) if current.as_ref() == expected => {
                self.cache.insert(key.to_string(), value).await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let _write = self.writes.lock().await;
        Ok(self.cache.remove(key).await.is_some())
    }

    async fn delete_all(&self) -> Result<()> {
        let _write = self.writes.lock().await;
        self.cache.invalidate_all();
        Ok(())
    }
}

impl Debug for MokaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaBackend")
            .field("entry_count", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .finish()
    }
}
