//! Tenant lookup interface.
//!
//! Tenant registration and administration are CRUD concerns owned by a
//! collaborator service; the engine only needs a read view of the tenant's
//! quota limits, active flag and default webhook target. That read side is
//! the [`TenantDirectory`] trait, so embedders plug in their own persistence
//! and tests use the in-memory directory.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::StoreError;

/// Default limits applied by the registration collaborator when a tenant
/// is created without explicit quotas.
pub const DEFAULT_DAILY_LIMIT: i64 = 1000;
pub const DEFAULT_MONTHLY_LIMIT: i64 = 30_000;

/// Read view of a registered tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub daily_limit: i64,
    pub monthly_limit: i64,
    pub is_active: bool,
    /// Target used by webhook deliveries when the request carries no
    /// override URL.
    pub default_webhook_url: Option<String>,
}

impl Tenant {
    /// An active tenant with the default limits. Limit overrides are set by
    /// adjusting the public fields.
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            daily_limit: DEFAULT_DAILY_LIMIT,
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
            is_active: true,
            default_webhook_url: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TenantLookupError {
    #[error("tenant not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-side tenant lookup, implemented by the collaborator's persistence
/// layer in production.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Tenant, TenantLookupError>;
}

/// In-memory tenant directory backed by `DashMap`.
///
/// Used by tests and by embedders that resolve tenants ahead of time.
#[derive(Default)]
pub struct MemoryTenantDirectory {
    tenants: DashMap<Uuid, Tenant>,
}

impl MemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id, tenant);
    }

    pub fn remove(&self, tenant_id: Uuid) {
        self.tenants.remove(&tenant_id);
    }
}

#[async_trait]
impl TenantDirectory for MemoryTenantDirectory {
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Tenant, TenantLookupError> {
        self.tenants
            .get(&tenant_id)
            .map(|entry| entry.clone())
            .ok_or(TenantLookupError::NotFound)
    }
}
