use crate::domain::value_objects::{OfflineActionId, OfflineActionType, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// リモート未確定の変更を表すアウトボックスのエントリ。
///
/// `synced` は非公開で、`mark_synced` 以外に書き換える手段がない（false → true のみ）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAction {
    pub id: OfflineActionId,
    pub user_id: UserId,
    pub action_type: OfflineActionType,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    synced: bool,
    #[serde(default)]
    synced_at: Option<DateTime<Utc>>,
}

impl OfflineAction {
    pub fn new(
        user_id: UserId,
        action_type: OfflineActionType,
        data: Value,
        created_at: DateTime<Utc>,
    ) -> Result<Self, String> {
        if !data.is_object() {
            return Err("Offline action payload must be a JSON object".to_string());
        }
        Ok(Self {
            id: OfflineActionId::generate(),
            user_id,
            action_type,
            data,
            created_at,
            synced: false,
            synced_at: None,
        })
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    /// 既に同期済みなら何もせず `false` を返す。
    pub fn mark_synced(&mut self, at: DateTime<Utc>) -> bool {
        if self.synced {
            return false;
        }
        self.synced = true;
        self.synced_at = Some(at);
        true
    }
}
