use crate::domain::entities::OfflineAction;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// バックグラウンド同期エンドポイントへの配送。アクション ID 単位で冪等であること。
#[async_trait]
pub trait SyncGateway: Send + Sync {
    async fn deliver(&self, action: &OfflineAction) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub attempted: u32,
    pub synced: u32,
    pub failed: u32,
    pub failed_ids: Vec<String>,
    pub pruned: u64,
    /// 別のドレインが実行中だったため何もしなかった
    pub skipped: bool,
}

/// 未同期アクションを送り出せる参加者。オンライン復帰やバックグラウンド同期から呼ばれる。
#[async_trait]
pub trait SyncParticipant: Send + Sync {
    /// 実行中のドレインがあれば何もせず `skipped` を返す
    async fn sync_pending(&self, trigger: &str) -> Result<DrainReport, AppError>;

    /// 実行中のドレインがあれば終わるのを待ってから送り出す
    async fn sync_pending_after_current(&self, trigger: &str) -> Result<DrainReport, AppError> {
        self.sync_pending(trigger).await
    }
}
