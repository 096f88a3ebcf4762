//! Delivery store factory.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StoreConfig;

use super::{DeliveryStore, MemoryDeliveryStore, PostgresDeliveryStore};

/// Create a delivery store based on configuration.
///
/// - `"postgres"`: returns a [`PostgresDeliveryStore`] if a pool is provided
/// - `"memory"` (default): returns a [`MemoryDeliveryStore`]
///
/// Requesting postgres without a pool falls back to memory with a warning so
/// a misconfigured deployment still starts in a degraded mode.
pub fn create_delivery_store(
    config: &StoreConfig,
    pg_pool: Option<PgPool>,
) -> Arc<dyn DeliveryStore> {
    match config.backend.as_str() {
        "postgres" => {
            if let Some(pool) = pg_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL delivery store");
                Arc::new(PostgresDeliveryStore::new(pool))
            } else {
                tracing::warn!(
                    "PostgreSQL delivery store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryDeliveryStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory delivery store");
            Arc::new(MemoryDeliveryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_defaults_to_memory() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, "memory");
        let _store = create_delivery_store(&config, None);
    }

    #[test]
    fn test_factory_falls_back_without_pool() {
        let config = StoreConfig {
            backend: "postgres".to_string(),
            ..Default::default()
        };
        // No pool available: must not panic, falls back to memory.
        let _store = create_delivery_store(&config, None);
    }
}
