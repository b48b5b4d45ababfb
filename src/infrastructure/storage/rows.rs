use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct LocalRecordRow {
    pub partition: String,
    pub record_key: String,
    pub body: String,
    pub expires_at: Option<i64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct PartitionCountRow {
    pub partition: String,
    pub record_count: i64,
}
