use crate::application::local_records::{HistoryEntry, LocalRecords};
use crate::application::ports::{Clock, RemoteProgressStore};
use crate::domain::entities::{GameScore, OfflineAction, QuizAttempt, UserProgress};
use crate::domain::gamification::StreakTransition;
use crate::domain::value_objects::{OfflineActionId, OfflineActionType, UserId};
use crate::shared::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// ミューテーションの結果。リモート反映はバックグラウンドで続く。
#[derive(Debug)]
pub struct ProgressUpdate<T> {
    pub progress: UserProgress,
    pub outcome: T,
    /// 状態が変わらなかった場合は `None`
    pub action_id: Option<OfflineActionId>,
    remote: Option<JoinHandle<bool>>,
}

impl<T> ProgressUpdate<T> {
    pub fn changed(&self) -> bool {
        self.action_id.is_some()
    }

    /// バックグラウンドのリモート更新を待つ。成功したら `true`。
    pub async fn wait_remote(self) -> bool {
        match self.remote {
            Some(handle) => handle.await.unwrap_or(false),
            None => false,
        }
    }
}

struct Change<T> {
    outcome: T,
    action_type: OfflineActionType,
    payload: Value,
    history: Option<HistoryEntry>,
}

struct Session {
    progress: Mutex<UserProgress>,
    /// リモートへ反映済みの最大リビジョン
    pushed_revision: Mutex<u64>,
}

/// 進捗を変更する唯一の入口。
///
/// ユーザーごとに直列化され、ローカルバックアップとアウトボックスへの書き込みが
/// 完了してから結果を返す。リモート更新は待たない。
pub struct ProgressService {
    records: LocalRecords,
    remote: Arc<dyn RemoteProgressStore>,
    clock: Arc<dyn Clock>,
    sessions: RwLock<HashMap<UserId, Arc<Session>>>,
}

impl ProgressService {
    pub fn new(
        records: LocalRecords,
        remote: Arc<dyn RemoteProgressStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            records,
            remote,
            clock,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 読み込み済みの作業コピーを登録する。既存のセッションは反映済みリビジョンごと置き換える。
    pub async fn attach(&self, progress: UserProgress) -> UserProgress {
        let user_id = progress.user_id.clone();
        let session = Arc::new(Session {
            progress: Mutex::new(progress.clone()),
            // これより新しいリビジョンだけをリモートへ送る
            pushed_revision: Mutex::new(progress.revision()),
        });
        let replaced = self
            .sessions
            .write()
            .await
            .insert(user_id.clone(), session)
            .is_some();
        debug!(
            user_id = %user_id,
            revision = progress.revision(),
            replaced,
            "progress session attached"
        );
        progress
    }

    pub async fn detach(&self, user_id: &UserId) -> bool {
        self.sessions.write().await.remove(user_id).is_some()
    }

    pub async fn current(&self, user_id: &UserId) -> Result<UserProgress, AppError> {
        let session = self.session(user_id).await?;
        let progress = session.progress.lock().await.clone();
        Ok(progress)
    }

    /// 負の値は減算（0 で止まる）
    pub async fn add_xp(
        &self,
        user_id: &UserId,
        amount: i64,
    ) -> Result<ProgressUpdate<()>, AppError> {
        self.mutate(user_id, |progress, now, _| {
            progress.add_xp(amount, now);
            Some(Change {
                outcome: (),
                action_type: OfflineActionType::ProgressUpdate,
                payload: json!({ "amount": amount }),
                history: None,
            })
        })
        .await
    }

    /// 獲得 XP を返す
    pub async fn complete_quiz(
        &self,
        user_id: &UserId,
        quiz_id: Option<String>,
        correct_answers: u32,
    ) -> Result<ProgressUpdate<u64>, AppError> {
        self.mutate(user_id, move |progress, now, _| {
            let awarded = progress.complete_quiz(correct_answers, now);
            let attempt = QuizAttempt::new(
                progress.user_id.clone(),
                quiz_id.clone(),
                correct_answers,
                awarded,
                now,
            );
            Some(Change {
                outcome: awarded,
                action_type: OfflineActionType::QuizAttempt,
                payload: json!({
                    "attemptId": attempt.id,
                    "quizId": quiz_id,
                    "correctAnswers": correct_answers,
                    "xpAwarded": awarded,
                }),
                history: Some(HistoryEntry::Quiz(attempt)),
            })
        })
        .await
    }

    pub async fn complete_game(
        &self,
        user_id: &UserId,
        game_id: Option<String>,
        score: u32,
    ) -> Result<ProgressUpdate<u64>, AppError> {
        self.mutate(user_id, move |progress, now, _| {
            let awarded = progress.complete_game(score, now);
            let row = GameScore::new(
                progress.user_id.clone(),
                game_id.clone(),
                score,
                awarded,
                now,
            );
            Some(Change {
                outcome: awarded,
                action_type: OfflineActionType::GameScore,
                payload: json!({
                    "scoreId": row.id,
                    "gameId": game_id,
                    "score": score,
                    "xpAwarded": awarded,
                }),
                history: Some(HistoryEntry::Game(row)),
            })
        })
        .await
    }

    /// 同じ日の二回目以降は何も書き込まない
    pub async fn update_streak(
        &self,
        user_id: &UserId,
    ) -> Result<ProgressUpdate<StreakTransition>, AppError> {
        self.mutate_or_unchanged(user_id, StreakTransition::Unchanged, |progress, now, today| {
            let transition = progress.update_streak(today, now);
            if transition == StreakTransition::Unchanged {
                return None;
            }
            Some(Change {
                outcome: transition,
                action_type: OfflineActionType::CheckIn,
                payload: json!({
                    "date": today,
                    "streak": progress.streak,
                    "transition": transition,
                }),
                history: None,
            })
        })
        .await
    }

    /// 新規に解除した場合 `outcome == true`
    pub async fn unlock_achievement(
        &self,
        user_id: &UserId,
        achievement: &str,
    ) -> Result<ProgressUpdate<bool>, AppError> {
        let achievement = achievement.trim();
        if achievement.is_empty() {
            return Err(AppError::InvalidInput(
                "Achievement id must not be empty".to_string(),
            ));
        }
        self.mutate_or_unchanged(user_id, false, |progress, now, _| {
            if !progress.unlock_achievement(achievement, now) {
                return None;
            }
            Some(Change {
                outcome: true,
                action_type: OfflineActionType::Achievement,
                payload: json!({ "achievement": achievement, "badges": progress.badges }),
                history: None,
            })
        })
        .await
    }

    async fn session(&self, user_id: &UserId) -> Result<Arc<Session>, AppError> {
        self.sessions
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("No progress session for {user_id}")))
    }

    async fn mutate<T, F>(&self, user_id: &UserId, apply: F) -> Result<ProgressUpdate<T>, AppError>
    where
        F: FnOnce(&mut UserProgress, DateTime<Utc>, NaiveDate) -> Option<Change<T>>,
    {
        self.apply_change(user_id, apply)
            .await?
            .ok_or_else(|| AppError::Internal("Mutation produced no change".to_string()))
    }

    async fn mutate_or_unchanged<T, F>(
        &self,
        user_id: &UserId,
        unchanged: T,
        apply: F,
    ) -> Result<ProgressUpdate<T>, AppError>
    where
        F: FnOnce(&mut UserProgress, DateTime<Utc>, NaiveDate) -> Option<Change<T>>,
    {
        match self.apply_change(user_id, apply).await? {
            Some(update) => Ok(update),
            None => Ok(ProgressUpdate {
                progress: self.current(user_id).await?,
                outcome: unchanged,
                action_id: None,
                remote: None,
            }),
        }
    }

    async fn apply_change<T, F>(
        &self,
        user_id: &UserId,
        apply: F,
    ) -> Result<Option<ProgressUpdate<T>>, AppError>
    where
        F: FnOnce(&mut UserProgress, DateTime<Utc>, NaiveDate) -> Option<Change<T>>,
    {
        let session = self.session(user_id).await?;
        // 読み取りからローカル書き込みまでユーザー単位で直列化する
        let mut current = session.progress.lock().await;

        let now = self.clock.now();
        let mut next = current.clone();
        let Some(change) = apply(&mut next, now, self.clock.today()) else {
            return Ok(None);
        };

        let mut payload = change.payload;
        if let Value::Object(map) = &mut payload {
            map.insert("revision".to_string(), json!(next.revision()));
            map.insert("progress".to_string(), serde_json::to_value(&next)?);
        }
        let action = OfflineAction::new(user_id.clone(), change.action_type, payload, now)
            .map_err(AppError::InvalidInput)?;
        // ローカルへの書き込みが失敗したらメモリ上の状態は変えない
        self.records
            .commit_progress_change(&next, change.history.as_ref(), &action)
            .await?;

        *current = next.clone();
        drop(current);

        info!(
            user_id = %user_id,
            action_type = %action.action_type,
            xp = next.xp(),
            level = next.level(),
            revision = next.revision(),
            "progress updated locally"
        );

        let remote = self.spawn_remote_push(session, next.clone(), action.id.clone());
        Ok(Some(ProgressUpdate {
            progress: next,
            outcome: change.outcome,
            action_id: Some(action.id),
            remote: Some(remote),
        }))
    }

    fn spawn_remote_push(
        &self,
        session: Arc<Session>,
        snapshot: UserProgress,
        action_id: OfflineActionId,
    ) -> JoinHandle<bool> {
        let remote = Arc::clone(&self.remote);
        let records = self.records.clone();
        let clock = Arc::clone(&self.clock);

        tokio::spawn(async move {
            let mut pushed = session.pushed_revision.lock().await;
            if *pushed >= snapshot.revision() {
                // より新しいリビジョンが既に反映済み。アクションはドレインに任せる
                debug!(
                    user_id = %snapshot.user_id,
                    revision = snapshot.revision(),
                    pushed = *pushed,
                    "skipping stale remote push"
                );
                return false;
            }

            if let Err(err) = remote.update(&snapshot).await {
                warn!(
                    user_id = %snapshot.user_id,
                    action_id = %action_id,
                    error = %err,
                    "remote progress update failed; left in outbox"
                );
                return false;
            }
            *pushed = snapshot.revision();
            drop(pushed);

            if let Err(err) = records.mark_action_synced(&action_id, clock.now()).await {
                warn!(action_id = %action_id, error = %err, "failed to mark action as synced");
            }
            true
        })
    }
}
