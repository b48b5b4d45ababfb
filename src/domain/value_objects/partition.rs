use serde::{Deserialize, Serialize};
use std::fmt;

/// ローカルストアの名前付きパーティション。キーパスとインデックスはここで固定する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    OfflineActions,
    QuizAttempts,
    GameScores,
    UserProgress,
    Cache,
}

impl Partition {
    pub const ALL: [Partition; 5] = [
        Partition::OfflineActions,
        Partition::QuizAttempts,
        Partition::GameScores,
        Partition::UserProgress,
        Partition::Cache,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Partition::OfflineActions => "offline_actions",
            Partition::QuizAttempts => "quiz_attempts",
            Partition::GameScores => "game_scores",
            Partition::UserProgress => "user_progress",
            Partition::Cache => "cache",
        }
    }

    /// レコード本体の中で主キーを保持するフィールド名
    pub fn key_path(&self) -> &'static str {
        match self {
            Partition::OfflineActions | Partition::QuizAttempts | Partition::GameScores => "id",
            Partition::UserProgress => "userId",
            Partition::Cache => "key",
        }
    }

    pub fn indexes(&self) -> &'static [&'static str] {
        match self {
            Partition::OfflineActions => &["userId", "synced"],
            Partition::QuizAttempts | Partition::GameScores => &["userId"],
            Partition::UserProgress | Partition::Cache => &[],
        }
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indexes().contains(&index)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
