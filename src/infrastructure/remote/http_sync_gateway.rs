use crate::application::ports::SyncGateway;
use crate::domain::entities::OfflineAction;
use crate::shared::config::{RemoteConfig, SyncConfig};
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// オフラインアクションを 1 件ずつ同期エンドポイントへ POST する
pub struct HttpSyncGateway {
    client: Client,
    endpoint_url: String,
    auth_token: Option<String>,
}

impl HttpSyncGateway {
    pub fn new(remote: &RemoteConfig, sync: &SyncConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(remote.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint_url: sync.endpoint_url.clone(),
            auth_token: remote.auth_token.clone(),
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}

#[async_trait]
impl SyncGateway for HttpSyncGateway {
    async fn deliver(&self, action: &OfflineAction) -> Result<(), AppError> {
        let mut request = self
            .client
            .post(&self.endpoint_url)
            .header(IDEMPOTENCY_HEADER, action.id.as_str())
            .json(action);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AppError::Network(format!(
                "sync endpoint rejected action {} with status {status}",
                action.id
            )))
        }
    }
}
