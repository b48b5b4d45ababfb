use crate::domain::value_objects::{CacheKey, Partition};
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionCount {
    pub partition: String,
    pub record_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub partitions: Vec<PartitionCount>,
    pub unsynced_actions: i64,
    pub expired_cache_entries: i64,
}

/// パーティション分割された永続ローカルストア。
///
/// 失敗は必ず `Err` で返す。呼び出し側はエラーが無いことを「ローカルに保存済み」の
/// 合図として扱うため、実装側で握りつぶしてはならない。
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// 何度呼んでも安全。同時に呼ばれた場合も初期化は一度だけ行われる。
    async fn initialize(&self) -> Result<(), AppError>;

    /// レコード本体からパーティションのキーパスとインデックス値を取り出して保存する。
    async fn put(&self, partition: Partition, record: &Value) -> Result<(), AppError>;

    /// 複数レコードを一つのトランザクションで保存する。一件でも失敗したら何も残さない。
    async fn put_all(&self, records: &[(Partition, Value)]) -> Result<(), AppError>;

    async fn get(&self, partition: Partition, key: &str) -> Result<Option<Value>, AppError>;

    async fn get_all_by_index(
        &self,
        partition: Partition,
        index: &str,
        value: &str,
    ) -> Result<Vec<Value>, AppError>;

    async fn delete(&self, partition: Partition, key: &str) -> Result<bool, AppError>;

    async fn cache_data(
        &self,
        key: &CacheKey,
        value: &Value,
        ttl_minutes: u32,
    ) -> Result<(), AppError>;

    /// 存在しない、または期限切れのエントリは `None`
    async fn get_cached_data(&self, key: &CacheKey) -> Result<Option<Value>, AppError>;

    async fn purge_expired_cache(&self) -> Result<u64, AppError>;

    async fn status(&self) -> Result<StoreStatus, AppError>;
}
