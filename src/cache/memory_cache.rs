use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

pub const RESOLVED_URL_TTL: Duration = Duration::from_secs(5 * 60);
pub const RESOLVED_URL_CAPACITY: NonZeroUsize = match NonZeroUsize::new(512) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolveKey {
    pub source_url: String,
    pub avpro: bool,
}

impl ResolveKey {
    pub fn new(source_url: impl Into<String>, avpro: bool) -> Self {
        Self {
            source_url: source_url.into(),
            avpro,
        }
    }
}

#[derive(Debug, Clone)]
struct ResolvedUrl {
    url: String,
    expires_at: Instant,
}

/// Successful URL resolutions, each valid for a fixed TTL. Failures are never stored.
pub struct ResolvedUrlCache {
    store: Mutex<LruCache<ResolveKey, ResolvedUrl>>,
    max_age: Duration,
}

impl ResolvedUrlCache {
    pub fn new(capacity: NonZeroUsize, max_age: Duration) -> Self {
        Self {
            store: Mutex::new(LruCache::new(capacity)),
            max_age,
        }
    }

    /// Returns the live entry for `key`, dropping it if it has expired.
    pub fn get(&self, key: &ResolveKey) -> Option<String> {
        let mut store = self.store.lock();
        let item = store.get(key)?;
        if Instant::now() < item.expires_at {
            return Some(item.url.clone());
        }
        store.pop(key);
        None
    }

    /// Stores `url` unless a live entry already exists, and returns whichever
    /// entry is live afterwards so every racer sees the same answer.
    pub fn insert_or_adopt(&self, key: ResolveKey, url: String) -> String {
        let mut store = self.store.lock();
        let now = Instant::now();
        if let Some(existing) = store.get(&key) {
            if now < existing.expires_at {
                return existing.url.clone();
            }
        }
        store.put(
            key,
            ResolvedUrl {
                url: url.clone(),
                expires_at: now + self.max_age,
            },
        );
        url
    }

    pub fn purge_expired(&self) {
        let mut store = self.store.lock();
        let now = Instant::now();
        let expired: Vec<ResolveKey> = store
            .iter()
            .filter(|(_, item)| item.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            store.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }
}

impl Default for ResolvedUrlCache {
    fn default() -> Self {
        Self::new(RESOLVED_URL_CAPACITY, RESOLVED_URL_TTL)
    }
}
