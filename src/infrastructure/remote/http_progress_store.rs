use crate::application::ports::RemoteProgressStore;
use crate::domain::entities::UserProgress;
use crate::domain::value_objects::UserId;
use crate::shared::config::RemoteConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

/// REST API 上の進捗コレクション（`/api/progress`）
pub struct HttpRemoteProgressStore {
    client: Client,
    collection_url: Url,
    auth_token: Option<String>,
}

impl HttpRemoteProgressStore {
    pub fn new(config: &RemoteConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut collection_url = Url::parse(&config.base_url).map_err(|e| {
            AppError::ConfigurationError(format!("Invalid base url {}: {e}", config.base_url))
        })?;
        collection_url
            .path_segments_mut()
            .map_err(|_| {
                AppError::ConfigurationError(format!(
                    "Base url {} cannot carry a path",
                    config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["api", "progress"]);

        Ok(Self {
            client,
            collection_url,
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn collection_url(&self) -> Url {
        self.collection_url.clone()
    }

    /// ユーザー ID は 1 つのパスセグメントとしてエンコードする
    pub fn document_url(&self, user_id: &UserId) -> Url {
        let mut url = self.collection_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(user_id.as_str());
        }
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn status_error(operation: &str, user_id: &UserId, status: StatusCode) -> AppError {
    AppError::Network(format!(
        "{operation} progress for {user_id} returned status {status}"
    ))
}

#[async_trait]
impl RemoteProgressStore for HttpRemoteProgressStore {
    async fn fetch(&self, user_id: &UserId) -> Result<Option<UserProgress>, AppError> {
        let response = self
            .authorize(self.client.get(self.document_url(user_id)))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let progress = response.json::<UserProgress>().await?;
                Ok(Some(progress))
            }
            status => Err(status_error("fetch", user_id, status)),
        }
    }

    async fn create(&self, progress: &UserProgress) -> Result<(), AppError> {
        let response = self
            .authorize(self.client.post(self.collection_url()))
            .json(progress)
            .send()
            .await?;

        match response.status() {
            // 既に存在する場合は作成済みとみなす
            StatusCode::CONFLICT => {
                debug!(user_id = %progress.user_id, "remote progress already exists");
                Ok(())
            }
            status if status.is_success() => Ok(()),
            status => Err(status_error("create", &progress.user_id, status)),
        }
    }

    async fn update(&self, progress: &UserProgress) -> Result<(), AppError> {
        let response = self
            .authorize(self.client.put(self.document_url(&progress.user_id)))
            .json(progress)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error("update", &progress.user_id, status))
        }
    }
}
