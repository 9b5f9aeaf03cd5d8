//! Model response cache
//!
//! Bounded in-memory store of successful replies, keyed by a digest of the
//! model name, system instruction and prompt.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::agent::LLMProvider;

type CacheKey = [u8; 32];

#[derive(Default)]
struct Entries {
    replies: HashMap<CacheKey, String>,
    order: VecDeque<CacheKey>,
}

pub struct LLMCache {
    entries: RwLock<Entries>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Hit/miss counters for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl LLMCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(model: &str, prompt: &str, system: Option<&str>) -> CacheKey {
        let mut hasher = Sha256::new();
        for part in [model, system.unwrap_or(""), prompt] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.finalize().into()
    }

    pub async fn get(&self, model: &str, prompt: &str, system: Option<&str>) -> Option<String> {
        let key = Self::key(model, prompt, system);
        let found = self.entries.read().await.replies.get(&key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub async fn insert(&self, model: &str, prompt: &str, system: Option<&str>, reply: String) {
        let key = Self::key(model, prompt, system);
        let mut entries = self.entries.write().await;
        if entries.replies.insert(key, reply).is_none() {
            entries.order.push_back(key);
        }
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.replies.remove(&oldest);
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().await.replies.len(),
        }
    }
}

impl Default for LLMCache {
    fn default() -> Self {
        Self::new(512)
    }
}

/// Provider that answers repeated prompts from an [`LLMCache`].
pub struct CachedProvider {
    inner: Arc<dyn LLMProvider>,
    cache: Arc<LLMCache>,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn LLMProvider>, cache: Arc<LLMCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl LLMProvider for CachedProvider {
    async fn generate(&self, model: &str, prompt: String, system: Option<String>) -> anyhow::Result<String> {
        if let Some(reply) = self.cache.get(model, &prompt, system.as_deref()).await {
            debug!("Response cache hit for model {}", model);
            return Ok(reply);
        }

        let reply = self.inner.generate(model, prompt.clone(), system.clone()).await?;
        self.cache.insert(model, &prompt, system.as_deref(), reply.clone()).await;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LLMProvider for CountingProvider {
        async fn generate(&self, _model: &str, prompt: String, _system: Option<String>) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("offline");
            }
            Ok(format!("reply to {}", prompt))
        }
    }

    #[tokio::test]
    async fn test_cache_hit_and_miss_counters() {
        let cache = LLMCache::new(4);
        cache.insert("m", "p", Some("s"), "r".into()).await;

        assert_eq!(cache.get("m", "p", Some("s")).await.as_deref(), Some("r"));
        assert!(cache.get("m", "p", None).await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_cache_evicts_oldest() {
        let cache = LLMCache::new(2);
        cache.insert("m", "a", None, "1".into()).await;
        cache.insert("m", "b", None, "2".into()).await;
        cache.insert("m", "c", None, "3".into()).await;

        assert!(cache.get("m", "a", None).await.is_none());
        assert_eq!(cache.get("m", "c", None).await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_cached_provider_reuses_reply() {
        let inner = Arc::new(CountingProvider { calls: AtomicUsize::new(0), fail: false });
        let provider = CachedProvider::new(inner.clone(), Arc::new(LLMCache::default()));

        let first = provider.generate("m", "q".into(), None).await.unwrap();
        let second = provider.generate("m", "q".into(), None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let inner = Arc::new(CountingProvider { calls: AtomicUsize::new(0), fail: true });
        let cache = Arc::new(LLMCache::default());
        let provider = CachedProvider::new(inner.clone(), cache.clone());

        assert!(provider.generate("m", "q".into(), None).await.is_err());
        assert!(provider.generate("m", "q".into(), None).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().await.entries, 0);
    }
}
