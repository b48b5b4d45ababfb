use async_trait::async_trait;
use ecolearn_lib::infrastructure::interceptor::{
    FetchError, Fetcher, InterceptedRequest, InterceptedResponse, ResponseType,
};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    routes: Arc<RwLock<HashMap<String, InterceptedResponse>>>,
    offline: Arc<RwLock<bool>>,
    requests: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn route(&self, url: &str, response: InterceptedResponse) {
        self.routes.write().await.insert(url.to_string(), response);
    }

    pub async fn route_ok(&self, url: &str, body: &str) {
        self.route(
            url,
            InterceptedResponse::new(StatusCode::OK, ResponseType::Basic, body.to_string()),
        )
        .await;
    }

    pub async fn set_offline(&self, offline: bool) {
        *self.offline.write().await = offline;
    }

    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<InterceptedResponse, FetchError> {
        self.requests
            .write()
            .await
            .push(format!("{} {}", request.method, request.url));
        if *self.offline.read().await {
            return Err(FetchError::Unreachable("offline".to_string()));
        }
        self.routes
            .read()
            .await
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Unreachable(format!("no route for {}", request.url)))
    }
}
