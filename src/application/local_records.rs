use crate::application::ports::LocalStore;
use crate::domain::entities::{GameScore, OfflineAction, QuizAttempt, UserProgress};
use crate::domain::value_objects::{OfflineActionId, Partition, UserId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// 進捗の変更に伴って残す履歴行
#[derive(Debug, Clone)]
pub enum HistoryEntry {
    Quiz(QuizAttempt),
    Game(GameScore),
}

/// `LocalStore` の上に型付きの操作（アウトボックス・進捗バックアップ・履歴）を載せる薄い層
#[derive(Clone)]
pub struct LocalRecords {
    store: Arc<dyn LocalStore>,
}

impl LocalRecords {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    // アウトボックス

    pub async fn enqueue_action(&self, action: &OfflineAction) -> Result<(), AppError> {
        self.ensure_not_queued(action).await?;
        self.put(Partition::OfflineActions, action).await
    }

    async fn ensure_not_queued(&self, action: &OfflineAction) -> Result<(), AppError> {
        if self
            .store
            .get(Partition::OfflineActions, action.id.as_str())
            .await?
            .is_some()
        {
            return Err(AppError::InvalidInput(format!(
                "Offline action {} already queued",
                action.id
            )));
        }
        Ok(())
    }

    pub async fn action(&self, id: &OfflineActionId) -> Result<Option<OfflineAction>, AppError> {
        self.get(Partition::OfflineActions, id.as_str()).await
    }

    /// 未同期アクションを古い順に返す
    pub async fn unsynced_actions(
        &self,
        user_id: Option<&UserId>,
    ) -> Result<Vec<OfflineAction>, AppError> {
        let mut actions: Vec<OfflineAction> = self
            .by_index(Partition::OfflineActions, "synced", "false")
            .await?;
        if let Some(user_id) = user_id {
            actions.retain(|action| &action.user_id == user_id);
        }
        actions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(actions)
    }

    /// 同期済みに遷移させた場合 `true`。既に同期済みなら `false`。
    pub async fn mark_action_synced(
        &self,
        id: &OfflineActionId,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let Some(mut action) = self.action(id).await? else {
            return Err(AppError::NotFound(format!("Offline action {id}")));
        };
        if !action.mark_synced(at) {
            return Ok(false);
        }
        self.put(Partition::OfflineActions, &action).await?;
        Ok(true)
    }

    /// `before` より前に同期済みになったアクションを削除する
    pub async fn prune_synced_actions(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let synced: Vec<OfflineAction> = self
            .by_index(Partition::OfflineActions, "synced", "true")
            .await?;
        let mut pruned = 0;
        for action in synced {
            let expired = action.synced_at().map(|at| at < before).unwrap_or(false);
            if expired
                && self
                    .store
                    .delete(Partition::OfflineActions, action.id.as_str())
                    .await?
            {
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    // 進捗バックアップ

    pub async fn save_progress_backup(&self, progress: &UserProgress) -> Result<(), AppError> {
        self.put(Partition::UserProgress, progress).await
    }

    pub async fn load_progress_backup(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserProgress>, AppError> {
        self.get(Partition::UserProgress, user_id.as_str()).await
    }

    /// 進捗バックアップ・履歴・アウトボックスへの追加を一度に書き込む。
    /// 失敗した場合はどれも残らない。
    pub async fn commit_progress_change(
        &self,
        progress: &UserProgress,
        history: Option<&HistoryEntry>,
        action: &OfflineAction,
    ) -> Result<(), AppError> {
        self.ensure_not_queued(action).await?;

        let mut batch = vec![(Partition::UserProgress, serde_json::to_value(progress)?)];
        match history {
            Some(HistoryEntry::Quiz(attempt)) => {
                batch.push((Partition::QuizAttempts, serde_json::to_value(attempt)?))
            }
            Some(HistoryEntry::Game(score)) => {
                batch.push((Partition::GameScores, serde_json::to_value(score)?))
            }
            None => {}
        }
        batch.push((Partition::OfflineActions, serde_json::to_value(action)?));

        self.store.put_all(&batch).await
    }

    // 履歴

    pub async fn quiz_attempts_for(&self, user_id: &UserId) -> Result<Vec<QuizAttempt>, AppError> {
        let mut attempts: Vec<QuizAttempt> = self
            .by_index(Partition::QuizAttempts, "userId", user_id.as_str())
            .await?;
        attempts.sort_by_key(|attempt| attempt.recorded_at);
        Ok(attempts)
    }

    pub async fn game_scores_for(&self, user_id: &UserId) -> Result<Vec<GameScore>, AppError> {
        let mut scores: Vec<GameScore> = self
            .by_index(Partition::GameScores, "userId", user_id.as_str())
            .await?;
        scores.sort_by_key(|score| score.recorded_at);
        Ok(scores)
    }

    async fn put<T: Serialize + Sync>(
        &self,
        partition: Partition,
        record: &T,
    ) -> Result<(), AppError> {
        let value = serde_json::to_value(record)?;
        self.store.put(partition, &value).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        partition: Partition,
        key: &str,
    ) -> Result<Option<T>, AppError> {
        self.store
            .get(partition, key)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(AppError::from)
    }

    async fn by_index<T: DeserializeOwned>(
        &self,
        partition: Partition,
        index: &str,
        value: &str,
    ) -> Result<Vec<T>, AppError> {
        self.store
            .get_all_by_index(partition, index, value)
            .await?
            .into_iter()
            .map(|record| serde_json::from_value(record).map_err(AppError::from))
            .collect()
    }
}
