use crate::domain::gamification::{self, StreakTransition};
use crate::domain::value_objects::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// ユーザーごとのゲーミフィケーション状態。
///
/// `xp` と `level` は非公開にしてあり、変更は必ずこの型のメソッドを通る。
/// そのため `level == xp / 100 + 1` が常に成り立つ。リモートやローカルバックアップから
/// 読み込んだ値も [`UserProgressRecord`] 経由で正規化される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "UserProgressRecord", into = "UserProgressRecord")]
pub struct UserProgress {
    pub user_id: UserId,
    pub display_name: Option<String>,
    xp: u64,
    level: u64,
    pub badges: u32,
    pub completed_quizzes: u32,
    pub games_played: u32,
    pub streak: u32,
    pub last_active_date: NaiveDate,
    pub achievements: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    revision: u64,
}

impl UserProgress {
    /// 初回セッション用の既定値（xp=0, level=1, 各カウンタ 0）
    pub fn new(
        user_id: UserId,
        display_name: Option<String>,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            display_name,
            xp: 0,
            level: gamification::level_for_xp(0),
            badges: 0,
            completed_quizzes: 0,
            games_played: 0,
            streak: 0,
            last_active_date: today,
            achievements: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn with_xp(mut self, xp: u64) -> Self {
        self.set_xp(xp);
        self
    }

    pub fn xp(&self) -> u64 {
        self.xp
    }

    pub fn level(&self) -> u64 {
        self.level
    }

    /// 変更のたびに進む単調なリビジョン番号
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn add_xp(&mut self, delta: i64, now: DateTime<Utc>) {
        self.set_xp(gamification::apply_xp_delta(self.xp, delta));
        self.touch(now);
    }

    /// 正解数 × 20 の XP を加算し、獲得 XP を返す。
    pub fn complete_quiz(&mut self, correct_answers: u32, now: DateTime<Utc>) -> u64 {
        let awarded = gamification::quiz_xp(correct_answers);
        self.set_xp(self.xp.saturating_add(awarded));
        self.completed_quizzes = self.completed_quizzes.saturating_add(1);
        self.touch(now);
        awarded
    }

    pub fn complete_game(&mut self, score: u32, now: DateTime<Utc>) -> u64 {
        let awarded = gamification::game_xp(score);
        self.set_xp(self.xp.saturating_add(awarded));
        self.games_played = self.games_played.saturating_add(1);
        self.touch(now);
        awarded
    }

    pub fn update_streak(&mut self, today: NaiveDate, now: DateTime<Utc>) -> StreakTransition {
        let (streak, transition) =
            gamification::next_streak(self.last_active_date, today, self.streak);
        if transition == StreakTransition::Unchanged {
            return transition;
        }
        self.streak = streak;
        self.last_active_date = today;
        self.touch(now);
        transition
    }

    /// 新規の実績なら `true`。バッジ数も合わせて増える。
    pub fn unlock_achievement(&mut self, achievement: &str, now: DateTime<Utc>) -> bool {
        if !self.achievements.insert(achievement.to_string()) {
            return false;
        }
        self.badges = self.badges.saturating_add(1);
        self.touch(now);
        true
    }

    /// フィールドごとの最大値を取る統合。明示的なユーザー操作からのみ呼ばれる。
    pub fn merged_fieldwise_max(&self, other: &UserProgress, now: DateTime<Utc>) -> UserProgress {
        let mut merged = self.clone();
        merged.set_xp(self.xp.max(other.xp));
        merged.badges = self.badges.max(other.badges);
        merged.completed_quizzes = self.completed_quizzes.max(other.completed_quizzes);
        merged.games_played = self.games_played.max(other.games_played);
        if other.last_active_date > self.last_active_date {
            merged.last_active_date = other.last_active_date;
            merged.streak = other.streak;
        } else if other.last_active_date == self.last_active_date {
            merged.streak = self.streak.max(other.streak);
        }
        merged
            .achievements
            .extend(other.achievements.iter().cloned());
        if merged.display_name.is_none() {
            merged.display_name = other.display_name.clone();
        }
        merged.created_at = self.created_at.min(other.created_at);
        merged.revision = self.revision.max(other.revision);
        merged.touch(now);
        merged
    }

    fn set_xp(&mut self, xp: u64) {
        self.xp = xp;
        self.level = gamification::level_for_xp(xp);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.revision = self.revision.saturating_add(1);
    }
}

/// リモート API とローカルバックアップで共通のワイヤ表現
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgressRecord {
    pub user_id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub xp: u64,
    #[serde(default)]
    pub level: u64,
    #[serde(default)]
    pub badges: u32,
    #[serde(default)]
    pub completed_quizzes: u32,
    #[serde(default)]
    pub games_played: u32,
    #[serde(default)]
    pub streak: u32,
    pub last_active_date: NaiveDate,
    #[serde(default)]
    pub achievements: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub revision: u64,
}

impl From<UserProgressRecord> for UserProgress {
    fn from(record: UserProgressRecord) -> Self {
        if record.level != gamification::level_for_xp(record.xp) {
            tracing::debug!(
                user_id = %record.user_id,
                stored_level = record.level,
                xp = record.xp,
                "normalizing stored level"
            );
        }
        Self {
            user_id: record.user_id,
            display_name: record.display_name,
            xp: record.xp,
            level: gamification::level_for_xp(record.xp),
            badges: record.badges,
            completed_quizzes: record.completed_quizzes,
            games_played: record.games_played,
            streak: record.streak,
            last_active_date: record.last_active_date,
            achievements: record.achievements,
            created_at: record.created_at,
            updated_at: record.updated_at,
            revision: record.revision,
        }
    }
}

impl From<UserProgress> for UserProgressRecord {
    fn from(progress: UserProgress) -> Self {
        Self {
            user_id: progress.user_id,
            display_name: progress.display_name,
            xp: progress.xp,
            level: progress.level,
            badges: progress.badges,
            completed_quizzes: progress.completed_quizzes,
            games_played: progress.games_played,
            streak: progress.streak,
            last_active_date: progress.last_active_date,
            achievements: progress.achievements,
            created_at: progress.created_at,
            updated_at: progress.updated_at,
            revision: progress.revision,
        }
    }
}
