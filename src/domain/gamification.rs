//! レベル計算とストリーク判定。クライアント側・サーバー側どちらの経路もここだけを使う。

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const XP_PER_LEVEL: u64 = 100;
pub const QUIZ_XP_PER_CORRECT_ANSWER: u64 = 20;
pub const GAME_XP_PER_POINT: u64 = 1;

/// `floor(xp / 100) + 1`
pub fn level_for_xp(xp: u64) -> u64 {
    xp / XP_PER_LEVEL + 1
}

/// 負の増分は減算として扱い、0 で止める。
pub fn apply_xp_delta(xp: u64, delta: i64) -> u64 {
    if delta >= 0 {
        xp.saturating_add(delta.unsigned_abs())
    } else {
        xp.saturating_sub(delta.unsigned_abs())
    }
}

pub fn quiz_xp(correct_answers: u32) -> u64 {
    u64::from(correct_answers) * QUIZ_XP_PER_CORRECT_ANSWER
}

pub fn game_xp(score: u32) -> u64 {
    u64::from(score) * GAME_XP_PER_POINT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakTransition {
    /// 同じ日に二回目以降の活動
    Unchanged,
    Extended,
    Reset,
}

/// 前回の活動日と今日の日付から次のストリーク値を決める。
pub fn next_streak(last_active: NaiveDate, today: NaiveDate, streak: u32) -> (u32, StreakTransition) {
    if last_active == today {
        return (streak, StreakTransition::Unchanged);
    }
    if today.pred_opt() == Some(last_active) {
        return (streak.saturating_add(1), StreakTransition::Extended);
    }
    (1, StreakTransition::Reset)
}
