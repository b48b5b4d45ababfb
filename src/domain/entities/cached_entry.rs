use crate::domain::value_objects::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// TTL 付きキャッシュの 1 エントリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry {
    pub key: CacheKey,
    pub value: Value,
    pub expires_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
