///! Decoded template caching with optional TTL
use dashmap::DashMap;
use image::DynamicImage;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Cache for decoded template images
pub struct TemplateCache {
    cache: Arc<DashMap<String, CachedTemplate>>,
    ttl: Option<Duration>,
}

struct CachedTemplate {
    image: Arc<DynamicImage>,
    expires_at: Option<SystemTime>,
}

impl TemplateCache {
    /// Cache that keeps entries until cleared
    pub fn new() -> Self {
        Self {
            cache: Arc::new(DashMap::new()),
            ttl: None,
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(DashMap::new()),
            ttl: Some(ttl),
        }
    }

    /// Get template from cache if still valid
    pub fn get(&self, key: &str) -> Option<Arc<DynamicImage>> {
        if let Some(entry) = self.cache.get(key) {
            match entry.expires_at {
                Some(expires_at) if expires_at <= SystemTime::now() => {}
                _ => return Some(Arc::clone(&entry.image)),
            }
            // Expired, remove it
            drop(entry);
            self.cache.remove(key);
        }
        None
    }

    pub fn put(&self, key: String, image: Arc<DynamicImage>) {
        let expires_at = self.ttl.map(|ttl| SystemTime::now() + ttl);
        self.cache.insert(key, CachedTemplate { image, expires_at });
    }

    pub fn invalidate(&self, key: &str) {
        self.cache.remove(key);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_basic_operations() {
        let cache = TemplateCache::new();
        assert!(cache.is_empty());

        cache.put("ok.png".to_string(), Arc::new(DynamicImage::new_rgb8(2, 2)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("ok.png").unwrap().width(), 2);

        cache.invalidate("ok.png");
        assert!(cache.get("ok.png").is_none());
    }

    #[test]
    fn test_cache_expiry() {
        let cache = TemplateCache::with_ttl(Duration::from_secs(0));
        cache.put("stale.png".to_string(), Arc::new(DynamicImage::new_rgb8(1, 1)));
        assert!(cache.get("stale.png").is_none());
        assert!(cache.is_empty());
    }
}
