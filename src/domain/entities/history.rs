use crate::domain::value_objects::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub id: String,
    pub user_id: UserId,
    #[serde(default)]
    pub quiz_id: Option<String>,
    pub correct_answers: u32,
    pub xp_awarded: u64,
    pub recorded_at: DateTime<Utc>,
}

impl QuizAttempt {
    pub fn new(
        user_id: UserId,
        quiz_id: Option<String>,
        correct_answers: u32,
        xp_awarded: u64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            quiz_id,
            correct_answers,
            xp_awarded,
            recorded_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameScore {
    pub id: String,
    pub user_id: UserId,
    #[serde(default)]
    pub game_id: Option<String>,
    pub score: u32,
    pub xp_awarded: u64,
    pub recorded_at: DateTime<Utc>,
}

impl GameScore {
    pub fn new(
        user_id: UserId,
        game_id: Option<String>,
        score: u32,
        xp_awarded: u64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            game_id,
            score,
            xp_awarded,
            recorded_at,
        }
    }
}
