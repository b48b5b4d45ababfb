use async_trait::async_trait;
use ecolearn_lib::application::ports::RemoteProgressStore;
use ecolearn_lib::{AppError, UserId, UserProgress};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMode {
    Available,
    /// すべての呼び出しがネットワークエラーになる
    Failing,
    /// 応答が返らない
    Hanging,
    /// 読み取りだけが失敗し、書き込みは通る
    ReadFailing,
}

#[derive(Debug, Clone)]
pub struct MockRemoteProgressStore {
    documents: Arc<RwLock<HashMap<UserId, UserProgress>>>,
    mode: Arc<RwLock<RemoteMode>>,
    updates: Arc<RwLock<u32>>,
}

impl MockRemoteProgressStore {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            mode: Arc::new(RwLock::new(RemoteMode::Available)),
            updates: Arc::new(RwLock::new(0)),
        }
    }

    pub async fn set_mode(&self, mode: RemoteMode) {
        *self.mode.write().await = mode;
    }

    pub async fn seed(&self, progress: UserProgress) {
        self.documents
            .write()
            .await
            .insert(progress.user_id.clone(), progress);
    }

    pub async fn document(&self, user_id: &UserId) -> Option<UserProgress> {
        self.documents.read().await.get(user_id).cloned()
    }

    pub async fn update_count(&self) -> u32 {
        *self.updates.read().await
    }

    async fn gate(&self) -> Result<(), AppError> {
        let mode = *self.mode.read().await;
        match mode {
            RemoteMode::Available | RemoteMode::ReadFailing => Ok(()),
            RemoteMode::Failing => Err(AppError::Network("remote unavailable".to_string())),
            RemoteMode::Hanging => std::future::pending().await,
        }
    }
}

#[async_trait]
impl RemoteProgressStore for MockRemoteProgressStore {
    async fn fetch(&self, user_id: &UserId) -> Result<Option<UserProgress>, AppError> {
        self.gate().await?;
        if *self.mode.read().await == RemoteMode::ReadFailing {
            return Err(AppError::DeserializationError(
                "unexpected progress document".to_string(),
            ));
        }
        Ok(self.document(user_id).await)
    }

    async fn create(&self, progress: &UserProgress) -> Result<(), AppError> {
        self.gate().await?;
        self.documents
            .write()
            .await
            .entry(progress.user_id.clone())
            .or_insert_with(|| progress.clone());
        Ok(())
    }

    async fn update(&self, progress: &UserProgress) -> Result<(), AppError> {
        self.gate().await?;
        self.seed(progress.clone()).await;
        *self.updates.write().await += 1;
        Ok(())
    }
}
