//! Notification domain: delivery types and the dispatch engine.

mod engine;
mod types;

pub use engine::{
    DeliveryOutcome, DeliveryReceipt, DispatchEngine, EngineStatsSnapshot, SubmitAck,
};
pub use types::{
    ChannelKind, DeliveryRecord, DeliveryRequest, DeliveryStatus, NewDeliveryRecord,
};
