use async_trait::async_trait;
use ecolearn_lib::application::ports::SyncGateway;
use ecolearn_lib::{AppError, OfflineAction};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct MockSyncGateway {
    delivered: Arc<RwLock<Vec<String>>>,
    rejected: Arc<RwLock<HashSet<String>>>,
    offline: Arc<RwLock<bool>>,
}

impl MockSyncGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_offline(&self, offline: bool) {
        *self.offline.write().await = offline;
    }

    pub async fn reject(&self, action_id: &str) {
        self.rejected.write().await.insert(action_id.to_string());
    }

    pub async fn delivered(&self) -> Vec<String> {
        self.delivered.read().await.clone()
    }
}

#[async_trait]
impl SyncGateway for MockSyncGateway {
    async fn deliver(&self, action: &OfflineAction) -> Result<(), AppError> {
        if *self.offline.read().await {
            return Err(AppError::Network("offline".to_string()));
        }
        if self.rejected.read().await.contains(action.id.as_str()) {
            return Err(AppError::Network("sync endpoint returned 500".to_string()));
        }
        self.delivered.write().await.push(action.id.to_string());
        Ok(())
    }
}
