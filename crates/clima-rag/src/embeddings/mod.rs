pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub use openai::OpenAiEmbedder;

/// Query embedding provider. Called once per retrieval request.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier, used in logs and as part of cache keys.
    fn model_name(&self) -> &str;
}

/// LRU cache in front of another provider. Follow-up turns re-embed almost
/// identical expanded queries, so repeats are common.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedEmbedder {
    /// `None` when `capacity` is 0 (caching disabled).
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Option<Self> {
        NonZeroUsize::new(capacity).map(|capacity| Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Wrap `inner` when caching is enabled, otherwise return it unchanged.
    pub fn wrap(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Arc<dyn EmbeddingProvider> {
        match Self::new(inner.clone(), capacity) {
            Some(cached) => Arc::new(cached),
            None => inner,
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = text.trim().to_string();
        let cached = self.cache.lock().get(&key).cloned();
        if let Some(hit) = cached {
            tracing::debug!(model = self.inner.model_name(), "Embedding cache hit");
            return Ok(hit);
        }

        let embedding = self.inner.embed(text).await?;
        self.cache.lock().put(key, embedding.clone());
        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32])
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_repeated_queries_hit_cache() {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedEmbedder::new(inner.clone(), 2).unwrap();

        cached.embed("split 12000").await.unwrap();
        cached.embed("split 12000 ").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cached.embed("janela").await.unwrap();
        cached.embed("portatil").await.unwrap();
        // "split 12000" was evicted.
        cached.embed("split 12000").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let inner: Arc<dyn EmbeddingProvider> = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        assert!(CachedEmbedder::new(inner.clone(), 0).is_none());
        assert_eq!(CachedEmbedder::wrap(inner, 0).model_name(), "counting");
    }
}
