//! PostgreSQL-backed delivery record store.
//!
//! Expected table (migrations are run by the embedding service, not here):
//!
//! ```sql
//! CREATE TABLE delivery_records (
//!     id           UUID PRIMARY KEY,
//!     tenant_id    UUID NOT NULL,
//!     channel      TEXT NOT NULL,
//!     recipient    TEXT NOT NULL,
//!     subject      TEXT,
//!     body         TEXT NOT NULL,
//!     status       TEXT NOT NULL DEFAULT 'pending',
//!     error_detail TEXT,
//!     sent_at      TIMESTAMPTZ,
//!     retry_count  INTEGER NOT NULL DEFAULT 0,
//!     created_at   TIMESTAMPTZ NOT NULL,
//!     updated_at   TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX idx_delivery_records_tenant_created
//!     ON delivery_records (tenant_id, status, created_at);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::notification::{DeliveryRecord, DeliveryStatus, NewDeliveryRecord};

use super::{DeliveryStore, StatusUpdate};

/// Raw row shape fetched from `delivery_records`.
type RecordRow = (
    Uuid,
    Uuid,
    String,
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    Option<DateTime<Utc>>,
    i32,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// PostgreSQL delivery record store.
pub struct PostgresDeliveryStore {
    pool: PgPool,
}

impl PostgresDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a store with its own connection pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect(&config.url)
            .await?;

        tracing::info!(
            pool_size = config.pool_size,
            "PostgreSQL delivery store pool created"
        );

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: RecordRow) -> Result<DeliveryRecord, StoreError> {
        let (
            id,
            tenant_id,
            channel,
            recipient,
            subject,
            body,
            status,
            error_detail,
            sent_at,
            retry_count,
            created_at,
            updated_at,
        ) = row;

        let channel = channel
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("record {}: channel {:?}", id, channel)))?;
        let status: DeliveryStatus = status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("record {}: {}", id, e)))?;

        Ok(DeliveryRecord {
            id,
            tenant_id,
            channel,
            recipient,
            subject,
            body,
            status,
            error_detail,
            sent_at,
            retry_count: retry_count.max(0) as u32,
            created_at,
            updated_at,
        })
    }
}

#[async_trait]
impl DeliveryStore for PostgresDeliveryStore {
    async fn create(&self, record: NewDeliveryRecord) -> Result<DeliveryRecord, StoreError> {
        let now = Utc::now();
        let record = DeliveryRecord {
            id: Uuid::new_v4(),
            tenant_id: record.tenant_id,
            channel: record.channel,
            recipient: record.recipient,
            subject: record.subject,
            body: record.body,
            status: DeliveryStatus::Pending,
            error_detail: None,
            sent_at: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO delivery_records
                (id, tenant_id, channel, recipient, subject, body, status,
                 retry_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id)
        .bind(record.tenant_id)
        .bind(record.channel.as_str())
        .bind(&record.recipient)
        .bind(&record.subject)
        .bind(&record.body)
        .bind(record.status.as_str())
        .bind(record.retry_count as i32)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_status(&self, id: Uuid, update: StatusUpdate) -> Result<(), StoreError> {
        // The `status = 'pending'` guard keeps terminal states sticky.
        let result = match &update {
            StatusUpdate::Sent { sent_at } => {
                sqlx::query(
                    r#"
                    UPDATE delivery_records
                    SET status = 'sent', sent_at = $2, error_detail = NULL, updated_at = NOW()
                    WHERE id = $1 AND status = 'pending'
                    "#,
                )
                .bind(id)
                .bind(sent_at)
                .execute(&self.pool)
                .await?
            }
            StatusUpdate::Failed {
                error_detail,
                retry_count,
            } => {
                sqlx::query(
                    r#"
                    UPDATE delivery_records
                    SET status = 'failed', error_detail = $2, retry_count = $3,
                        sent_at = NULL, updated_at = NOW()
                    WHERE id = $1 AND status = 'pending'
                    "#,
                )
                .bind(id)
                .bind(error_detail)
                .bind(*retry_count as i32)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            tracing::warn!(
                record_id = %id,
                attempted = %update.status(),
                "Skipping status update on missing or terminal delivery record"
            );
        }

        Ok(())
    }

    async fn find(
        &self,
        id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<DeliveryRecord>, StoreError> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, channel, recipient, subject, body, status,
                   error_detail, sent_at, retry_count, created_at, updated_at
            FROM delivery_records
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::map_row).transpose()
    }

    async fn count_by_status_since(
        &self,
        tenant_id: Uuid,
        status: DeliveryStatus,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM delivery_records
            WHERE tenant_id = $1 AND status = $2 AND created_at >= $3
            "#,
        )
        .bind(tenant_id)
        .bind(status.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }
}
