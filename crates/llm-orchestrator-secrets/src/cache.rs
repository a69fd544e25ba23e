//! TTL-based in-memory cache wrapping any [`SecretProvider`], so repeated
//! lookups for the same key within the TTL window skip the backend.

use crate::{Result, SecretProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

pub struct SecretCache<P: SecretProvider> {
    inner: P,
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl<P: SecretProvider> SecretCache<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drops the cached entry for `key`, forcing the next lookup to hit
    /// the backend. Useful after a known rotation.
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

#[async_trait]
impl<P: SecretProvider> SecretProvider for SecretCache<P> {
    async fn get_secret(&self, key: &str) -> Result<String> {
        if let Some(entry) = self.entries.lock().get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(entry.value.clone());
            }
        }
        let value = self.inner.get_secret(key).await?;
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SecretProvider for CountingProvider {
        async fn get_secret(&self, key: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("value-for-{key}"))
        }
    }

    #[tokio::test]
    async fn serves_repeated_reads_from_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = SecretCache::new(
            CountingProvider { calls: calls.clone() },
            Duration::from_secs(60),
        );
        assert_eq!(cache.get_secret("a").await.unwrap(), "value-for-a");
        assert_eq!(cache.get_secret("a").await.unwrap(), "value-for-a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = SecretCache::new(
            CountingProvider { calls: calls.clone() },
            Duration::from_secs(60),
        );
        cache.get_secret("a").await.unwrap();
        cache.invalidate("a");
        cache.get_secret("a").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = SecretCache::new(
            CountingProvider { calls: calls.clone() },
            Duration::from_millis(1),
        );
        cache.get_secret("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.get_secret("a").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
