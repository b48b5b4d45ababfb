use crate::domain::entities::UserProgress;
use crate::domain::value_objects::UserId;
use crate::shared::error::AppError;
use async_trait::async_trait;

/// 進捗の正本を持つリモートストア
#[async_trait]
pub trait RemoteProgressStore: Send + Sync {
    async fn fetch(&self, user_id: &UserId) -> Result<Option<UserProgress>, AppError>;

    /// 既に存在する場合も成功扱い
    async fn create(&self, progress: &UserProgress) -> Result<(), AppError>;

    async fn update(&self, progress: &UserProgress) -> Result<(), AppError>;
}
