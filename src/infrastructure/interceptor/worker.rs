use super::cache_names::CacheNames;
use super::cache_storage::ResponseCacheStorage;
use super::fetcher::{FetchError, Fetcher};
use super::request::{
    FetchOutcome, InterceptedRequest, InterceptedResponse, RequestClass, RequestMode,
};
use crate::application::ports::{DrainReport, SyncParticipant};
use crate::shared::config::InterceptorConfig;
use crate::shared::error::AppError;
use futures::future::try_join_all;
use reqwest::{Method, Url};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// ページとネットワークの間に入るリクエスト仲介。
///
/// - API リクエスト: ネットワーク優先、失敗時は動的キャッシュ
/// - 静的アセット: キャッシュ優先、無ければネットワーク
/// - GET 以外: 常にネットワークへそのまま流す
pub struct NetworkInterceptor {
    fetcher: Arc<dyn Fetcher>,
    caches: Arc<dyn ResponseCacheStorage>,
    sync: Arc<dyn SyncParticipant>,
    names: CacheNames,
    origin: Url,
    api_prefix: String,
    offline_document: String,
    manifest: Vec<String>,
    sync_tag: String,
}

impl NetworkInterceptor {
    pub fn new(
        config: &InterceptorConfig,
        sync_tag: &str,
        fetcher: Arc<dyn Fetcher>,
        caches: Arc<dyn ResponseCacheStorage>,
        sync: Arc<dyn SyncParticipant>,
    ) -> Result<Self, AppError> {
        let origin = Url::parse(&config.origin).map_err(|e| {
            AppError::ConfigurationError(format!("Invalid origin {}: {e}", config.origin))
        })?;
        let names = CacheNames::for_build(
            &config.cache_prefix,
            &config.build_id,
            &config.precache_manifest,
        );

        Ok(Self {
            fetcher,
            caches,
            sync,
            names,
            origin,
            api_prefix: config.api_prefix.clone(),
            offline_document: config.offline_document.clone(),
            manifest: config.precache_manifest.clone(),
            sync_tag: sync_tag.to_string(),
        })
    }

    pub fn cache_names(&self) -> &CacheNames {
        &self.names
    }

    pub fn classify(&self, request: &InterceptedRequest) -> RequestClass {
        if request.url.path().starts_with(&self.api_prefix) {
            RequestClass::Api
        } else {
            RequestClass::Static
        }
    }

    /// マニフェストの全アセットを静的キャッシュへ入れる。1 件でも失敗したら何も入れない。
    pub async fn install(&self) -> Result<usize, AppError> {
        let requests = self
            .manifest
            .iter()
            .map(|asset| self.resolve(asset).map(InterceptedRequest::get))
            .collect::<Result<Vec<_>, _>>()?;

        let responses = try_join_all(requests.iter().map(|request| async move {
            let response = self.fetcher.fetch(request).await.map_err(|e| {
                AppError::Network(format!("Failed to precache {}: {e}", request.url))
            })?;
            if !response.status.is_success() {
                return Err(AppError::Network(format!(
                    "Failed to precache {}: status {}",
                    request.url, response.status
                )));
            }
            Ok((request.cache_key(), response))
        }))
        .await?;

        let count = responses.len();
        for (key, response) in responses {
            self.caches
                .put(&self.names.static_cache, &key, response)
                .await;
        }
        info!(
            cache = %self.names.static_cache,
            assets = count,
            "precached static assets"
        );
        Ok(count)
    }

    /// 現行の 2 つ以外のキャッシュを削除し、削除した名前を返す
    pub async fn activate(&self) -> Vec<String> {
        let mut deleted = Vec::new();
        for name in self.caches.cache_names().await {
            if self.names.is_current(&name) {
                continue;
            }
            if self.caches.delete_cache(&name).await {
                deleted.push(name);
            }
        }
        if !deleted.is_empty() {
            info!(deleted = ?deleted, "removed outdated caches");
        }
        deleted
    }

    pub async fn handle_fetch(
        &self,
        request: &InterceptedRequest,
    ) -> Result<FetchOutcome, FetchError> {
        if request.method != Method::GET {
            // 変更系リクエストはキャッシュに触れない
            return self.fetcher.fetch(request).await.map(FetchOutcome::Network);
        }

        match self.classify(request) {
            RequestClass::Api => Ok(self.network_first(request).await),
            RequestClass::Static => Ok(self.cache_first(request).await),
        }
    }

    /// 対応するタグのときだけアウトボックスをドレインする
    pub async fn handle_sync(&self, tag: &str) -> Result<Option<DrainReport>, AppError> {
        if tag != self.sync_tag {
            debug!(tag, "ignoring unknown sync tag");
            return Ok(None);
        }
        self.sync.sync_pending(tag).await.map(Some)
    }

    async fn network_first(&self, request: &InterceptedRequest) -> FetchOutcome {
        let key = request.cache_key();
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_dynamic(&key, &response).await;
                FetchOutcome::Network(response)
            }
            Err(err) => {
                warn!(url = %request.url, error = %err, "api request failed; trying cache");
                match self.caches.match_in(&self.names.dynamic_cache, &key).await {
                    Some(cached) => FetchOutcome::Cache(cached),
                    None => FetchOutcome::Offline,
                }
            }
        }
    }

    async fn cache_first(&self, request: &InterceptedRequest) -> FetchOutcome {
        let key = request.cache_key();
        if let Some(cached) = self.match_any(&key).await {
            return FetchOutcome::Cache(cached);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_dynamic(&key, &response).await;
                FetchOutcome::Network(response)
            }
            Err(err) => {
                debug!(url = %request.url, error = %err, "static request failed");
                if request.mode == RequestMode::Navigate {
                    if let Some(document) = self.offline_document().await {
                        return FetchOutcome::Cache(document);
                    }
                }
                FetchOutcome::Offline
            }
        }
    }

    async fn match_any(&self, key: &str) -> Option<InterceptedResponse> {
        if let Some(hit) = self.caches.match_in(&self.names.static_cache, key).await {
            return Some(hit);
        }
        self.caches.match_in(&self.names.dynamic_cache, key).await
    }

    async fn store_dynamic(&self, key: &str, response: &InterceptedResponse) {
        if !response.is_cacheable() {
            debug!(
                key,
                status = %response.status,
                response_type = ?response.response_type,
                "response not cacheable"
            );
            return;
        }
        self.caches
            .put(&self.names.dynamic_cache, key, response.clone())
            .await;
    }

    async fn offline_document(&self) -> Option<InterceptedResponse> {
        let url = self.resolve(&self.offline_document).ok()?;
        let key = InterceptedRequest::navigate(url).cache_key();
        self.caches.match_in(&self.names.static_cache, &key).await
    }

    fn resolve(&self, path: &str) -> Result<Url, AppError> {
        self.origin
            .join(path)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid asset path {path}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::interceptor::cache_storage::MemoryCacheStorage;
    use crate::infrastructure::interceptor::request::ResponseType;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubFetcher {
        offline: AtomicBool,
        responses: Mutex<HashMap<String, InterceptedResponse>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn respond(&self, url: &str, response: InterceptedResponse) {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), response);
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(
            &self,
            request: &InterceptedRequest,
        ) -> Result<InterceptedResponse, FetchError> {
            self.calls.lock().unwrap().push(request.url.to_string());
            if self.offline.load(Ordering::SeqCst) {
                return Err(FetchError::Unreachable("offline".into()));
            }
            self.responses
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .cloned()
                .ok_or_else(|| FetchError::Unreachable(request.url.to_string()))
        }
    }

    struct NoopSync;

    #[async_trait]
    impl SyncParticipant for NoopSync {
        async fn sync_pending(&self, _trigger: &str) -> Result<DrainReport, AppError> {
            Ok(DrainReport::default())
        }
    }

    fn config() -> InterceptorConfig {
        InterceptorConfig {
            origin: "http://localhost:3000".into(),
            api_prefix: "/api/".into(),
            offline_document: "/offline.html".into(),
            cache_prefix: "ecolearn".into(),
            build_id: "test".into(),
            precache_manifest: vec!["/".into(), "/offline.html".into()],
        }
    }

    fn ok(body: &str) -> InterceptedResponse {
        InterceptedResponse::new(StatusCode::OK, ResponseType::Basic, body.to_string())
    }

    fn url(path: &str) -> Url {
        Url::parse("http://localhost:3000").unwrap().join(path).unwrap()
    }

    fn interceptor(fetcher: Arc<StubFetcher>, caches: MemoryCacheStorage) -> NetworkInterceptor {
        NetworkInterceptor::new(
            &config(),
            "background-sync",
            fetcher,
            Arc::new(caches),
            Arc::new(NoopSync),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn install_is_all_or_nothing() {
        let fetcher = Arc::new(StubFetcher::default());
        fetcher.respond("http://localhost:3000/", ok("shell"));
        let caches = MemoryCacheStorage::new();
        let worker = interceptor(fetcher.clone(), caches.clone());

        assert!(worker.install().await.is_err());
        assert_eq!(caches.len(&worker.cache_names().static_cache).await, 0);

        fetcher.respond("http://localhost:3000/offline.html", ok("offline"));
        assert_eq!(worker.install().await.unwrap(), 2);
        assert_eq!(caches.len(&worker.cache_names().static_cache).await, 2);
    }

    #[tokio::test]
    async fn api_requests_prefer_network_and_fall_back_to_cache() {
        let fetcher = Arc::new(StubFetcher::default());
        fetcher.respond("http://localhost:3000/api/quizzes", ok("fresh"));
        let worker = interceptor(fetcher.clone(), MemoryCacheStorage::new());
        let request = InterceptedRequest::get(url("/api/quizzes"));

        let first = worker.handle_fetch(&request).await.unwrap();
        assert!(matches!(first, FetchOutcome::Network(_)));

        fetcher.offline.store(true, Ordering::SeqCst);
        let second = worker.handle_fetch(&request).await.unwrap();
        assert!(second.is_from_cache());
        assert_eq!(second.response().unwrap().body, "fresh");

        let missing = InterceptedRequest::get(url("/api/leaderboard"));
        assert_eq!(
            worker.handle_fetch(&missing).await.unwrap(),
            FetchOutcome::Offline
        );
    }

    #[tokio::test]
    async fn activate_removes_outdated_caches() {
        let caches = MemoryCacheStorage::new();
        caches.put("ecolearn-static-old", "k", ok("old")).await;
        let worker = interceptor(Arc::new(StubFetcher::default()), caches.clone());
        caches
            .put(&worker.cache_names().dynamic_cache, "k", ok("new"))
            .await;

        let deleted = worker.activate().await;

        assert_eq!(deleted, vec!["ecolearn-static-old".to_string()]);
        assert_eq!(caches.len(&worker.cache_names().dynamic_cache).await, 1);
    }

    #[tokio::test]
    async fn unknown_sync_tag_is_ignored() {
        let worker = interceptor(Arc::new(StubFetcher::default()), MemoryCacheStorage::new());
        assert!(worker.handle_sync("other").await.unwrap().is_none());
        assert!(worker.handle_sync("background-sync").await.unwrap().is_some());
    }
}
