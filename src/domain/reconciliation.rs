//! 作業コピー（通常はリモート由来）とローカルバックアップの比較。
//!
//! 判定は 4 つのフィールドに対する一方向の比較でしかない。バックアップ側がどれか 1 つでも
//! 厳密に大きければ「データ欠損の可能性あり」とする。両側にそれぞれ大きいフィールドが
//! ある場合は `diverged` として報告するだけで、自動では解決しない。

use crate::domain::entities::UserProgress;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressField {
    Xp,
    CompletedQuizzes,
    GamesPlayed,
    Level,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDelta {
    pub field: ProgressField,
    pub local: u64,
    pub remote: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub potential_loss: bool,
    pub diverged: bool,
    pub ahead_locally: Vec<FieldDelta>,
    pub ahead_remotely: Vec<FieldDelta>,
    pub local_revision: u64,
    pub remote_revision: u64,
}

impl ReconciliationReport {
    pub fn in_sync(&self) -> bool {
        self.ahead_locally.is_empty() && self.ahead_remotely.is_empty()
    }
}

pub fn compare(working: &UserProgress, backup: &UserProgress) -> ReconciliationReport {
    let pairs = [
        (ProgressField::Xp, backup.xp(), working.xp()),
        (
            ProgressField::CompletedQuizzes,
            u64::from(backup.completed_quizzes),
            u64::from(working.completed_quizzes),
        ),
        (
            ProgressField::GamesPlayed,
            u64::from(backup.games_played),
            u64::from(working.games_played),
        ),
        (ProgressField::Level, backup.level(), working.level()),
    ];

    let mut ahead_locally = Vec::new();
    let mut ahead_remotely = Vec::new();
    for (field, local, remote) in pairs {
        let delta = FieldDelta {
            field,
            local,
            remote,
        };
        if local > remote {
            ahead_locally.push(delta);
        } else if remote > local {
            ahead_remotely.push(delta);
        }
    }

    ReconciliationReport {
        potential_loss: !ahead_locally.is_empty(),
        diverged: !ahead_locally.is_empty() && !ahead_remotely.is_empty(),
        ahead_locally,
        ahead_remotely,
        local_revision: backup.revision(),
        remote_revision: working.revision(),
    }
}
