use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::{build_http_client, load_shard_directory_with, BasketResult, ShardDirectory};

struct CacheEntry<V> {
    value: Arc<V>,
    loaded_at: Instant,
}

/// Caller-owned cache of loaded sources keyed by URL or path.
///
/// Entries older than `ttl` are dropped on access; `None` keeps them until
/// they are invalidated.
pub struct SourceCache<V> {
    ttl: Option<Duration>,
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V> SourceCache<V> {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Arc<V>> {
        let expired = match (self.entries.get(key), self.ttl) {
            (None, _) => return None,
            (Some(entry), Some(ttl)) => entry.loaded_at.elapsed() >= ttl,
            (Some(_), None) => false,
        };
        if expired {
            debug!("source cache entry {} expired", key);
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&mut self, key: &str, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                loaded_at: Instant::now(),
            },
        );
        value
    }

    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct ShardDirectoryCache {
    client: reqwest::Client,
    timeout: Duration,
    inner: Mutex<SourceCache<ShardDirectory>>,
}

impl ShardDirectoryCache {
    pub fn new(ttl: Option<Duration>, timeout: Duration) -> BasketResult<Self> {
        Ok(Self {
            client: build_http_client()?,
            timeout,
            inner: Mutex::new(SourceCache::new(ttl)),
        })
    }

    /// Seed the cache with a directory obtained elsewhere (e.g. a local snapshot).
    pub async fn put(&self, url: &str, shard_dir: ShardDirectory) -> Arc<ShardDirectory> {
        self.inner.lock().await.insert(url, shard_dir)
    }

    pub async fn get_or_load(&self, url: &str) -> BasketResult<Arc<ShardDirectory>> {
        let mut cache = self.inner.lock().await;
        if let Some(dir) = cache.get(url) {
            return Ok(dir);
        }
        let dir = load_shard_directory_with(&self.client, url, self.timeout).await?;
        Ok(cache.insert(url, dir))
    }

    /// Same as `get_or_load` for a snapshot on disk, keyed by its path.
    pub async fn get_or_load_file(&self, path: &Path) -> BasketResult<Arc<ShardDirectory>> {
        let key = path.to_string_lossy();
        let mut cache = self.inner.lock().await;
        if let Some(dir) = cache.get(&key) {
            return Ok(dir);
        }
        let dir = ShardDirectory::load_from_file(path).await?;
        Ok(cache.insert(&key, dir))
    }

    pub async fn refresh(&self, url: &str) -> BasketResult<Arc<ShardDirectory>> {
        let mut cache = self.inner.lock().await;
        let dir = load_shard_directory_with(&self.client, url, self.timeout).await?;
        Ok(cache.insert(url, dir))
    }

    pub async fn invalidate(&self, url: &str) -> bool {
        self.inner.lock().await.invalidate(url)
    }
}
