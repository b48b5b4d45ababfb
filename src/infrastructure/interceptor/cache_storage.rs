use super::request::InterceptedResponse;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 名前付きキャッシュの集合（ブラウザの Cache Storage に相当）
#[async_trait]
pub trait ResponseCacheStorage: Send + Sync {
    async fn put(&self, cache_name: &str, key: &str, response: InterceptedResponse);

    async fn match_in(&self, cache_name: &str, key: &str) -> Option<InterceptedResponse>;

    async fn cache_names(&self) -> Vec<String>;

    /// 存在した場合 `true`
    async fn delete_cache(&self, cache_name: &str) -> bool;
}

#[derive(Clone, Default)]
pub struct MemoryCacheStorage {
    caches: Arc<RwLock<HashMap<String, HashMap<String, InterceptedResponse>>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, cache_name: &str) -> usize {
        let caches = self.caches.read().await;
        caches.get(cache_name).map(HashMap::len).unwrap_or(0)
    }

    pub async fn contains(&self, cache_name: &str, key: &str) -> bool {
        let caches = self.caches.read().await;
        caches
            .get(cache_name)
            .map(|cache| cache.contains_key(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ResponseCacheStorage for MemoryCacheStorage {
    async fn put(&self, cache_name: &str, key: &str, response: InterceptedResponse) {
        let mut caches = self.caches.write().await;
        caches
            .entry(cache_name.to_string())
            .or_default()
            .insert(key.to_string(), response);
    }

    async fn match_in(&self, cache_name: &str, key: &str) -> Option<InterceptedResponse> {
        let caches = self.caches.read().await;
        caches.get(cache_name)?.get(key).cloned()
    }

    async fn cache_names(&self) -> Vec<String> {
        let caches = self.caches.read().await;
        let mut names: Vec<String> = caches.keys().cloned().collect();
        names.sort();
        names
    }

    async fn delete_cache(&self, cache_name: &str) -> bool {
        let mut caches = self.caches.write().await;
        caches.remove(cache_name).is_some()
    }
}
