use super::rows::{LocalRecordRow, PartitionCountRow};
use crate::application::ports::{Clock, LocalStore, PartitionCount, StoreStatus, SystemClock};
use crate::domain::value_objects::{CacheKey, Partition};
use crate::shared::config::DatabaseConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const BUSY_TIMEOUT_SECS: u64 = 5;

/// SQLite を使ったローカル永続ストア。
///
/// 接続プールは最初の操作（または `initialize`）で一度だけ開かれ、マイグレーションも
/// その時に流れる。同時に初期化を要求された場合は同じ初期化を待つ。
pub struct SqliteLocalStore {
    database_url: String,
    max_connections: u32,
    clock: Arc<dyn Clock>,
    pool: OnceCell<Pool<Sqlite>>,
}

impl SqliteLocalStore {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &DatabaseConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            database_url: config.url.clone(),
            max_connections: config.max_connections.max(1),
            clock,
            pool: OnceCell::new(),
        }
    }

    /// テストや一時利用向けのメモリ内ストア
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::with_clock(
            &DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            clock,
        )
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            info!("Local store closed");
        }
    }

    fn is_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }

    async fn pool(&self) -> Result<&Pool<Sqlite>, AppError> {
        self.pool.get_or_try_init(|| self.open()).await
    }

    async fn open(&self) -> Result<Pool<Sqlite>, AppError> {
        let mut options = SqliteConnectOptions::from_str(&self.database_url)?
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(BUSY_TIMEOUT_SECS));

        let mut pool_options = SqlitePoolOptions::new();
        if self.is_memory() {
            // メモリ DB は接続ごとに別物になるため 1 本に固定し、破棄もさせない
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            if let Some(parent) = database_file(&self.database_url).and_then(|p| p.parent()) {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            options = options.journal_mode(SqliteJournalMode::Wal);
            pool_options = pool_options.max_connections(self.max_connections);
        }

        let pool = pool_options.connect_with(options).await?;
        info!("Local store connected: {}", self.database_url);

        debug!("Running local store migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("Local store migrations completed");

        Ok(pool)
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

fn database_file(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next()?;
    if path.is_empty() {
        None
    } else {
        Some(Path::new(path))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn record_key(partition: Partition, record: &Value) -> Result<String, AppError> {
    record
        .get(partition.key_path())
        .and_then(scalar_to_string)
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Record for partition {} is missing key `{}`",
                partition,
                partition.key_path()
            ))
        })
}

fn decode_rows(rows: Vec<LocalRecordRow>) -> Result<Vec<Value>, AppError> {
    rows.into_iter()
        .map(|row| serde_json::from_str(&row.body).map_err(AppError::from))
        .collect()
}

fn check_record(partition: Partition, record: &Value) -> Result<String, AppError> {
    if !record.is_object() {
        return Err(AppError::InvalidInput(format!(
            "Record for partition {partition} must be a JSON object"
        )));
    }
    record_key(partition, record)
}

async fn insert_record(
    conn: &mut SqliteConnection,
    partition: Partition,
    record: &Value,
    expires_at: Option<i64>,
    now: i64,
) -> Result<(), AppError> {
    let key = check_record(partition, record)?;
    let body = serde_json::to_string(record)?;

    sqlx::query(
        r#"
        INSERT INTO local_records (partition, record_key, body, expires_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(partition, record_key) DO UPDATE SET
            body = excluded.body,
            expires_at = excluded.expires_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(partition.name())
    .bind(&key)
    .bind(&body)
    .bind(expires_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    sqlx::query(r#"DELETE FROM local_record_indexes WHERE partition = ?1 AND record_key = ?2"#)
        .bind(partition.name())
        .bind(&key)
        .execute(&mut *conn)
        .await?;

    for index in partition.indexes() {
        let Some(index_value) = record.get(*index).and_then(scalar_to_string) else {
            continue;
        };
        sqlx::query(
            r#"
            INSERT INTO local_record_indexes (partition, index_name, index_value, record_key)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(partition.name())
        .bind(*index)
        .bind(&index_value)
        .bind(&key)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

impl SqliteLocalStore {
    async fn write_record(
        &self,
        partition: Partition,
        record: &Value,
        expires_at: Option<i64>,
    ) -> Result<(), AppError> {
        let now = self.now_ms();
        let pool = self.pool().await?;

        let mut tx = pool.begin().await?;
        insert_record(&mut *tx, partition, record, expires_at, now).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn initialize(&self) -> Result<(), AppError> {
        self.pool().await.map(|_| ())
    }

    async fn put(&self, partition: Partition, record: &Value) -> Result<(), AppError> {
        self.write_record(partition, record, None).await
    }

    async fn put_all(&self, records: &[(Partition, Value)]) -> Result<(), AppError> {
        let now = self.now_ms();
        let pool = self.pool().await?;

        // コミット前に戻った場合はトランザクションごと破棄される
        let mut tx = pool.begin().await?;
        for (partition, record) in records {
            insert_record(&mut *tx, *partition, record, None, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, partition: Partition, key: &str) -> Result<Option<Value>, AppError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, LocalRecordRow>(
            r#"
            SELECT partition, record_key, body, expires_at, updated_at
            FROM local_records
            WHERE partition = ?1 AND record_key = ?2
              AND (expires_at IS NULL OR expires_at > ?3)
            "#,
        )
        .bind(partition.name())
        .bind(key)
        .bind(self.now_ms())
        .fetch_optional(pool)
        .await?;

        row.map(|row| serde_json::from_str(&row.body).map_err(AppError::from))
            .transpose()
    }

    async fn get_all_by_index(
        &self,
        partition: Partition,
        index: &str,
        value: &str,
    ) -> Result<Vec<Value>, AppError> {
        if !partition.has_index(index) {
            return Err(AppError::InvalidInput(format!(
                "Partition {partition} has no index `{index}`"
            )));
        }
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, LocalRecordRow>(
            r#"
            SELECT r.partition, r.record_key, r.body, r.expires_at, r.updated_at
            FROM local_records r
            JOIN local_record_indexes i
              ON i.partition = r.partition AND i.record_key = r.record_key
            WHERE i.partition = ?1 AND i.index_name = ?2 AND i.index_value = ?3
              AND (r.expires_at IS NULL OR r.expires_at > ?4)
            ORDER BY r.record_key ASC
            "#,
        )
        .bind(partition.name())
        .bind(index)
        .bind(value)
        .bind(self.now_ms())
        .fetch_all(pool)
        .await?;

        decode_rows(rows)
    }

    async fn delete(&self, partition: Partition, key: &str) -> Result<bool, AppError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        sqlx::query(r#"DELETE FROM local_record_indexes WHERE partition = ?1 AND record_key = ?2"#)
            .bind(partition.name())
            .bind(key)
            .execute(&mut *tx)
            .await?;
        let result =
            sqlx::query(r#"DELETE FROM local_records WHERE partition = ?1 AND record_key = ?2"#)
                .bind(partition.name())
                .bind(key)
                .execute(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cache_data(
        &self,
        key: &CacheKey,
        value: &Value,
        ttl_minutes: u32,
    ) -> Result<(), AppError> {
        let expires_at = self.clock.now() + Duration::minutes(i64::from(ttl_minutes));
        let record = json!({
            "key": key.as_str(),
            "value": value,
            "expiresAt": expires_at,
        });
        self.write_record(Partition::Cache, &record, Some(expires_at.timestamp_millis()))
            .await
    }

    async fn get_cached_data(&self, key: &CacheKey) -> Result<Option<Value>, AppError> {
        Ok(self
            .get(Partition::Cache, key.as_str())
            .await?
            .and_then(|mut record| record.get_mut("value").map(Value::take)))
    }

    async fn purge_expired_cache(&self) -> Result<u64, AppError> {
        let pool = self.pool().await?;
        let now = self.now_ms();
        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM local_record_indexes
            WHERE partition = ?1 AND record_key IN (
                SELECT record_key FROM local_records
                WHERE partition = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2
            )
            "#,
        )
        .bind(Partition::Cache.name())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query(
            r#"
            DELETE FROM local_records
            WHERE partition = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2
            "#,
        )
        .bind(Partition::Cache.name())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let purged = result.rows_affected();
        if purged > 0 {
            debug!(purged, "purged expired cache entries");
        }
        Ok(purged)
    }

    async fn status(&self) -> Result<StoreStatus, AppError> {
        let pool = self.pool().await?;
        let counts = sqlx::query_as::<_, PartitionCountRow>(
            r#"
            SELECT partition, COUNT(*) AS record_count
            FROM local_records
            GROUP BY partition
            "#,
        )
        .fetch_all(pool)
        .await?;

        let partitions = Partition::ALL
            .iter()
            .map(|partition| PartitionCount {
                partition: partition.name().to_string(),
                record_count: counts
                    .iter()
                    .find(|row| row.partition == partition.name())
                    .map(|row| row.record_count)
                    .unwrap_or(0),
            })
            .collect();

        let unsynced_actions: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM local_record_indexes
            WHERE partition = ?1 AND index_name = 'synced' AND index_value = 'false'
            "#,
        )
        .bind(Partition::OfflineActions.name())
        .fetch_one(pool)
        .await?;

        let expired_cache_entries: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM local_records
            WHERE partition = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2
            "#,
        )
        .bind(Partition::Cache.name())
        .bind(self.now_ms())
        .fetch_one(pool)
        .await?;

        Ok(StoreStatus {
            partitions,
            unsynced_actions,
            expired_cache_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::ManualClock;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn put_get_and_delete_round_trip() {
        let store = SqliteLocalStore::in_memory(clock());
        let record = json!({"userId": "learner", "xp": 10});

        store.put(Partition::UserProgress, &record).await.unwrap();
        let loaded = store.get(Partition::UserProgress, "learner").await.unwrap();
        assert_eq!(loaded, Some(record));

        assert!(store.delete(Partition::UserProgress, "learner").await.unwrap());
        assert!(!store.delete(Partition::UserProgress, "learner").await.unwrap());
        assert!(store
            .get(Partition::UserProgress, "learner")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn index_lookup_follows_rewrites() {
        let store = SqliteLocalStore::in_memory(clock());
        store
            .put(
                Partition::OfflineActions,
                &json!({"id": "a1", "userId": "u1", "synced": false}),
            )
            .await
            .unwrap();
        store
            .put(
                Partition::OfflineActions,
                &json!({"id": "a2", "userId": "u1", "synced": false}),
            )
            .await
            .unwrap();
        store
            .put(
                Partition::OfflineActions,
                &json!({"id": "a1", "userId": "u1", "synced": true}),
            )
            .await
            .unwrap();

        let unsynced = store
            .get_all_by_index(Partition::OfflineActions, "synced", "false")
            .await
            .unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0]["id"], "a2");

        let by_user = store
            .get_all_by_index(Partition::OfflineActions, "userId", "u1")
            .await
            .unwrap();
        assert_eq!(by_user.len(), 2);
    }

    #[tokio::test]
    async fn put_all_writes_everything_or_nothing() {
        let store = SqliteLocalStore::in_memory(clock());
        store
            .put_all(&[
                (Partition::UserProgress, json!({"userId": "u1", "xp": 20})),
                (
                    Partition::OfflineActions,
                    json!({"id": "a1", "userId": "u1", "synced": false}),
                ),
            ])
            .await
            .unwrap();
        assert!(store.get(Partition::OfflineActions, "a1").await.unwrap().is_some());

        let err = store
            .put_all(&[
                (Partition::UserProgress, json!({"userId": "u1", "xp": 90})),
                (Partition::OfflineActions, json!({"userId": "u1"})),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let progress = store.get(Partition::UserProgress, "u1").await.unwrap().unwrap();
        assert_eq!(progress["xp"], 20);
    }

    #[tokio::test]
    async fn unknown_index_and_missing_key_are_rejected() {
        let store = SqliteLocalStore::in_memory(clock());
        let err = store
            .get_all_by_index(Partition::Cache, "userId", "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = store
            .put(Partition::QuizAttempts, &json!({"userId": "u1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn cached_data_misses_after_expiry() {
        let clock = clock();
        let store = SqliteLocalStore::in_memory(clock.clone());
        let key = CacheKey::parse("leaderboard").unwrap();

        store
            .cache_data(&key, &json!({"top": ["ana"]}), 5)
            .await
            .unwrap();
        assert_eq!(
            store.get_cached_data(&key).await.unwrap(),
            Some(json!({"top": ["ana"]}))
        );

        clock.advance(Duration::minutes(5));
        assert_eq!(store.get_cached_data(&key).await.unwrap(), None);

        // 行自体はまだ残っている
        let status = store.status().await.unwrap();
        assert_eq!(status.expired_cache_entries, 1);

        assert_eq!(store.purge_expired_cache().await.unwrap(), 1);
        assert_eq!(store.status().await.unwrap().expired_cache_entries, 0);
    }

    #[tokio::test]
    async fn concurrent_initialize_opens_single_pool() {
        let store = Arc::new(SqliteLocalStore::in_memory(clock()));
        let mut handles = vec![];
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.initialize().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(store.is_initialized());

        store
            .put(Partition::UserProgress, &json!({"userId": "u1"}))
            .await
            .unwrap();
        let status = store.status().await.unwrap();
        let progress = status
            .partitions
            .iter()
            .find(|p| p.partition == "user_progress")
            .unwrap();
        assert_eq!(progress.record_count, 1);
    }

    #[tokio::test]
    async fn closed_store_surfaces_errors() {
        let store = SqliteLocalStore::in_memory(clock());
        store.initialize().await.unwrap();
        store.close().await;

        let err = store
            .put(Partition::UserProgress, &json!({"userId": "u1"}))
            .await
            .unwrap_err();
        assert!(err.is_durability_failure());
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("local.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", db_path.display()),
            max_connections: 2,
        };

        let store = SqliteLocalStore::with_clock(&config, clock());
        store
            .put(Partition::UserProgress, &json!({"userId": "u1", "xp": 40}))
            .await
            .unwrap();
        store.close().await;
        assert!(db_path.exists());

        let reopened = SqliteLocalStore::with_clock(&config, clock());
        let loaded = reopened.get(Partition::UserProgress, "u1").await.unwrap();
        assert_eq!(loaded.unwrap()["xp"], 40);
        reopened.close().await;
    }
}
