use crate::application::local_records::LocalRecords;
use crate::application::ports::{Clock, RemoteProgressStore};
use crate::domain::entities::UserProgress;
use crate::domain::reconciliation::{self, ReconciliationReport};
use crate::domain::value_objects::UserId;
use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSource {
    Remote,
    LocalBackup,
    Bootstrapped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOutcome {
    pub progress: UserProgress,
    pub source: ProgressSource,
    /// 作業コピーがリモートに存在する（または今回書き込めた）か
    pub remote_persisted: bool,
    /// バックアップと比較した場合の結果
    pub report: Option<ReconciliationReport>,
}

impl LoadOutcome {
    pub fn potential_loss(&self) -> bool {
        self.report
            .as_ref()
            .map(|report| report.potential_loss)
            .unwrap_or(false)
    }
}

/// リモートの進捗とローカルバックアップの突き合わせ。
///
/// 欠損の可能性を検出しても自動では解決せず、`recover` / `force_sync` /
/// `merge_fieldwise_max` のいずれかを利用者が明示的に選ぶ。
pub struct ReconciliationService {
    remote: Arc<dyn RemoteProgressStore>,
    records: LocalRecords,
    clock: Arc<dyn Clock>,
}

impl ReconciliationService {
    pub fn new(
        remote: Arc<dyn RemoteProgressStore>,
        records: LocalRecords,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote,
            records,
            clock,
        }
    }

    pub async fn load(
        &self,
        user_id: &UserId,
        display_name: Option<String>,
    ) -> Result<LoadOutcome, AppError> {
        let backup = self.records.load_progress_backup(user_id).await?;

        let remote = match self.remote.fetch(user_id).await {
            Ok(remote) => remote,
            Err(err) => {
                // 読み取り失敗はリモート不在とは扱わない
                warn!(
                    user_id = %user_id,
                    error = %err,
                    "failed to load remote progress; staying local"
                );
                return self.adopt_local(user_id, display_name, backup).await;
            }
        };

        if let Some(working) = remote {
            let report = backup
                .as_ref()
                .map(|backup| reconciliation::compare(&working, backup));
            let loss = report
                .as_ref()
                .map(|report| report.potential_loss)
                .unwrap_or(false);
            if loss {
                warn!(user_id = %user_id, "local backup is ahead of remote progress");
            } else {
                // 欠損の疑いがある間はバックアップを上書きしない
                self.records.save_progress_backup(&working).await?;
            }
            return Ok(LoadOutcome {
                progress: working,
                source: ProgressSource::Remote,
                remote_persisted: true,
                report,
            });
        }

        self.fallback(user_id, display_name, backup).await
    }

    /// ローカルバックアップを優先して作業コピーを作り直し、リモートへ書き戻す
    pub async fn recover(&self, user_id: &UserId) -> Result<LoadOutcome, AppError> {
        let backup = self.records.load_progress_backup(user_id).await?;
        info!(user_id = %user_id, has_backup = backup.is_some(), "recovering progress");
        self.fallback(user_id, None, backup).await
    }

    /// リモートの内容でローカルバックアップを無条件に上書きする
    pub async fn force_sync(&self, user_id: &UserId) -> Result<UserProgress, AppError> {
        let remote = self
            .remote
            .fetch(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Remote progress for {user_id}")))?;
        self.records.save_progress_backup(&remote).await?;
        info!(user_id = %user_id, "local backup overwritten from remote");
        Ok(remote)
    }

    /// 両方のコピーをフィールドごとの最大値で統合し、両側へ書き込む
    pub async fn merge_fieldwise_max(&self, user_id: &UserId) -> Result<UserProgress, AppError> {
        let remote = self
            .remote
            .fetch(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Remote progress for {user_id}")))?;
        let merged = match self.records.load_progress_backup(user_id).await? {
            Some(backup) => remote.merged_fieldwise_max(&backup, self.clock.now()),
            None => remote,
        };
        self.records.save_progress_backup(&merged).await?;
        self.remote.update(&merged).await?;
        info!(user_id = %user_id, xp = merged.xp(), "merged local and remote progress");
        Ok(merged)
    }

    /// リモートの状態が分からない間の作業コピー。リモートには一切書き込まない。
    async fn adopt_local(
        &self,
        user_id: &UserId,
        display_name: Option<String>,
        backup: Option<UserProgress>,
    ) -> Result<LoadOutcome, AppError> {
        if let Some(backup) = backup {
            return Ok(LoadOutcome {
                progress: backup,
                source: ProgressSource::LocalBackup,
                remote_persisted: false,
                report: None,
            });
        }

        let progress = UserProgress::new(
            user_id.clone(),
            display_name,
            self.clock.today(),
            self.clock.now(),
        );
        self.records.save_progress_backup(&progress).await?;
        info!(user_id = %user_id, "bootstrapped local-only progress");
        Ok(LoadOutcome {
            progress,
            source: ProgressSource::Bootstrapped,
            remote_persisted: false,
            report: None,
        })
    }

    async fn fallback(
        &self,
        user_id: &UserId,
        display_name: Option<String>,
        backup: Option<UserProgress>,
    ) -> Result<LoadOutcome, AppError> {
        if let Some(backup) = backup {
            let remote_persisted = self.push_upsert(&backup).await;
            return Ok(LoadOutcome {
                progress: backup,
                source: ProgressSource::LocalBackup,
                remote_persisted,
                report: None,
            });
        }

        let progress = UserProgress::new(
            user_id.clone(),
            display_name,
            self.clock.today(),
            self.clock.now(),
        );
        self.records.save_progress_backup(&progress).await?;
        let remote_persisted = match self.remote.create(&progress).await {
            Ok(()) => true,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "keeping new progress local-only");
                false
            }
        };
        info!(user_id = %user_id, remote_persisted, "bootstrapped new progress");
        Ok(LoadOutcome {
            progress,
            source: ProgressSource::Bootstrapped,
            remote_persisted,
            report: None,
        })
    }

    /// 作成（既存なら成功）してから更新する
    async fn push_upsert(&self, progress: &UserProgress) -> bool {
        let result = match self.remote.create(progress).await {
            Ok(()) => self.remote.update(progress).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    user_id = %progress.user_id,
                    error = %err,
                    "failed to push local backup to remote"
                );
                false
            }
        }
    }
}
