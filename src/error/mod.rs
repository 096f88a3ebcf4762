//! Error taxonomy for the dispatch engine.
//!
//! Three families of failures exist, and they surface at different times:
//! - [`AdmissionError`]: synchronous, returned to the caller before any
//!   delivery record is created.
//! - [`TransportError`]: asynchronous, never crosses back to the caller;
//!   recorded verbatim as the failed record's error detail.
//! - [`StoreError`]: persistence failures, possible in either phase.

use thiserror::Error;
use uuid::Uuid;

use crate::notification::ChannelKind;

/// Synchronous admission failures. No record is created when one of these
/// is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("invalid notification channel: {0} (supported: email, sms, webhook)")]
    InvalidChannel(String),

    #[error("invalid recipient for {channel} channel: {reason}")]
    InvalidRecipient {
        channel: ChannelKind,
        reason: String,
    },

    #[error("notification body must not be empty")]
    EmptyBody,

    #[error("daily limit reached ({sent}/{limit}), try again tomorrow")]
    DailyLimitExceeded { sent: u64, limit: i64 },

    #[error("monthly limit reached ({sent}/{limit})")]
    MonthlyLimitExceeded { sent: u64, limit: i64 },

    #[error("tenant account is inactive")]
    TenantInactive,

    #[error("tenant not found")]
    TenantNotFound,
}

/// Asynchronous delivery failures. The engine stores the rendered message
/// as the record's error detail; no structured codes cross the async
/// boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no transport configured for {0} channel")]
    Unconfigured(ChannelKind),

    #[error("{channel} credentials not configured")]
    MissingCredentials { channel: ChannelKind },

    #[error("webhook URL not provided")]
    MissingWebhookUrl,

    #[error("{channel} request failed: {source}")]
    Request {
        channel: ChannelKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("{channel} delivery rejected upstream: status {status}")]
    UpstreamStatus { channel: ChannelKind, status: u16 },
}

/// Persistence failures from the delivery record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("corrupt delivery record row: {0}")]
    Corrupt(String),

    #[error("delivery record store unavailable: {0}")]
    Unavailable(String),
}

/// Top-level error for the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("delivery record {0} not found")]
    NotFound(Uuid),

    #[error("internal error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Whether this error was raised by the synchronous admission check.
    pub fn is_admission(&self) -> bool {
        matches!(self, EngineError::Admission(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
