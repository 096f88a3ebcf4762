//! In-memory delivery record store using DashMap.
//!
//! Records are lost on restart; this backend exists for tests and for
//! single-process deployments that accept best-effort bookkeeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::notification::{DeliveryRecord, DeliveryStatus, NewDeliveryRecord};

use super::{DeliveryStore, StatusUpdate};

/// In-memory delivery record store.
#[derive(Default)]
pub struct MemoryDeliveryStore {
    records: DashMap<Uuid, DeliveryRecord>,
}

impl MemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, for test assertions.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DeliveryStore for MemoryDeliveryStore {
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
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_status(&self, id: Uuid, update: StatusUpdate) -> Result<(), StoreError> {
        let mut entry = match self.records.get_mut(&id) {
            Some(entry) => entry,
            None => {
                tracing::warn!(record_id = %id, "Status update for unknown delivery record");
                return Ok(());
            }
        };

        if entry.status.is_terminal() {
            tracing::warn!(
                record_id = %id,
                current = %entry.status,
                attempted = %update.status(),
                "Skipping status update on terminal delivery record"
            );
            return Ok(());
        }

        match update {
            StatusUpdate::Sent { sent_at } => {
                entry.status = DeliveryStatus::Sent;
                entry.sent_at = Some(sent_at);
                entry.error_detail = None;
            }
            StatusUpdate::Failed {
                error_detail,
                retry_count,
            } => {
                entry.status = DeliveryStatus::Failed;
                entry.error_detail = Some(error_detail);
                entry.retry_count = retry_count;
                entry.sent_at = None;
            }
        }
        entry.updated_at = Utc::now();

        Ok(())
    }

    async fn find(
        &self,
        id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<DeliveryRecord>, StoreError> {
        Ok(self
            .records
            .get(&id)
            .filter(|entry| entry.tenant_id == tenant_id)
            .map(|entry| entry.clone()))
    }

    async fn count_by_status_since(
        &self,
        tenant_id: Uuid,
        status: DeliveryStatus,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count = self
            .records
            .iter()
            .filter(|entry| {
                entry.tenant_id == tenant_id
                    && entry.status == status
                    && entry.created_at >= since
            })
            .count();
        Ok(count as u64)
    }
}
