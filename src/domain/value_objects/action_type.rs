use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// アウトボックスが扱うアクション種別（閉じた集合）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineActionType {
    QuizAttempt,
    GameScore,
    Achievement,
    CheckIn,
    ProgressUpdate,
}

impl OfflineActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfflineActionType::QuizAttempt => "quiz_attempt",
            OfflineActionType::GameScore => "game_score",
            OfflineActionType::Achievement => "achievement",
            OfflineActionType::CheckIn => "check_in",
            OfflineActionType::ProgressUpdate => "progress_update",
        }
    }
}

impl fmt::Display for OfflineActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OfflineActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quiz_attempt" => Ok(OfflineActionType::QuizAttempt),
            "game_score" => Ok(OfflineActionType::GameScore),
            "achievement" => Ok(OfflineActionType::Achievement),
            "check_in" => Ok(OfflineActionType::CheckIn),
            "progress_update" => Ok(OfflineActionType::ProgressUpdate),
            other => Err(format!("Unknown offline action type: {other}")),
        }
    }
}
