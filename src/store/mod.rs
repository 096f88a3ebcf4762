//! Delivery record store.
//!
//! The store is the sole writer of persisted delivery state; the dispatch
//! engine never mutates records outside this interface. Each record is
//! written at most twice: once at creation (Pending) and once by the owning
//! reconciliation task (Sent or Failed), so updates are last-writer-wins
//! keyed by record id with no optimistic versioning.

mod factory;
mod memory_backend;
mod postgres_backend;

pub use factory::create_delivery_store;
pub use memory_backend::MemoryDeliveryStore;
pub use postgres_backend::PostgresDeliveryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::notification::{DeliveryRecord, DeliveryStatus, NewDeliveryRecord};

/// The terminal fields written by reconciliation.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    Sent {
        sent_at: DateTime<Utc>,
    },
    Failed {
        error_detail: String,
        /// Attempt counter at the time of the failure. Recorded as-is;
        /// the engine runs no automatic retries.
        retry_count: u32,
    },
}

impl StatusUpdate {
    pub fn status(&self) -> DeliveryStatus {
        match self {
            StatusUpdate::Sent { .. } => DeliveryStatus::Sent,
            StatusUpdate::Failed { .. } => DeliveryStatus::Failed,
        }
    }
}

/// Durable table of notification attempts; source of truth for status
/// queries and quota computation.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Persist a new record in `Pending` status, assigning its id and
    /// timestamps.
    async fn create(&self, record: NewDeliveryRecord) -> Result<DeliveryRecord, StoreError>;

    /// Apply the reconciliation outcome to a record.
    ///
    /// Terminal states are sticky: an update against a record that already
    /// left `Pending` is skipped with a warning rather than applied, which
    /// keeps record status monotonic.
    async fn update_status(&self, id: Uuid, update: StatusUpdate) -> Result<(), StoreError>;

    /// Tenant-scoped lookup. A record belonging to another tenant resolves
    /// as `None`, never as a cross-tenant leak.
    async fn find(
        &self,
        id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<DeliveryRecord>, StoreError>;

    /// Count records for a tenant in the given status created at or after
    /// `since`. Drives quota admission and usage reporting.
    async fn count_by_status_since(
        &self,
        tenant_id: Uuid,
        status: DeliveryStatus,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}
