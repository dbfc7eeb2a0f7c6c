use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{self, queries};
use crate::models::record::ResultRecord;

/// Key-value store of result records, keyed by job id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a record, replacing any previous record for the same job.
    async fn put(&self, record: &ResultRecord) -> Result<(), RecordStoreError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<ResultRecord>, RecordStoreError>;

    async fn health_check(&self) -> Result<(), RecordStoreError>;
}

/// PostgreSQL-backed record store.
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn put(&self, record: &ResultRecord) -> Result<(), RecordStoreError> {
        queries::upsert_result(&self.pool, record).await?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ResultRecord>, RecordStoreError> {
        Ok(queries::get_result(&self.pool, job_id).await?)
    }

    async fn health_check(&self) -> Result<(), RecordStoreError> {
        Ok(db::ping(&self.pool).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}
