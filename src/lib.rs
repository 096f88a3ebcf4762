// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain layer (business logic)
pub mod notification;
pub mod quota;
pub mod store;
pub mod tenant;
pub mod transport;
