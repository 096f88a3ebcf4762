//! Channel transports.
//!
//! A transport owns the protocol for one delivery mechanism and surfaces
//! only a boolean-like outcome plus a human-readable detail string; the
//! engine stores that text verbatim as the failed record's error detail.
//! Each transport bounds its upstream call with a short client timeout so a
//! stalled upstream cannot pin a delivery worker.
//!
//! Success thresholds differ per channel and that asymmetry is deliberate,
//! inherited behavior: email and SMS treat any status >= 300 as failure,
//! webhooks accept redirects and only fail at >= 400.

mod email;
mod sms;
mod webhook;

pub use email::EmailTransport;
pub use sms::SmsTransport;
pub use webhook::WebhookTransport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use uuid::Uuid;

use crate::config::Settings;
use crate::error::TransportError;
use crate::notification::ChannelKind;

/// Payload handed to a transport by a delivery worker.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub record_id: Uuid,
    pub tenant_id: Uuid,
    pub channel: ChannelKind,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    /// Resolved webhook target: the request override when present, else the
    /// tenant's configured default. None for non-webhook channels or when
    /// neither was available.
    pub webhook_url: Option<String>,
    /// Attempt counter at dispatch time, recorded unchanged on failure.
    pub retry_count: u32,
}

/// Polymorphic delivery capability, one implementation per channel kind.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn deliver(&self, job: &DeliveryJob) -> Result<(), TransportError>;
}

/// Maps channel kinds to their configured transports.
///
/// Resolving a kind with no registered transport yields
/// [`TransportError::Unconfigured`], which reconciliation records like any
/// other delivery failure.
#[derive(Default)]
pub struct TransportRegistry {
    transports: HashMap<ChannelKind, Arc<dyn ChannelTransport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the production registry from settings. All three channels are
    /// registered; transports with missing credentials report that at
    /// delivery time, matching the upstream behavior.
    pub fn from_settings(settings: &Settings) -> Result<Self, TransportError> {
        let mut registry = Self::new();
        registry.register(Arc::new(EmailTransport::new(settings.email.clone())?));
        registry.register(Arc::new(SmsTransport::new(settings.sms.clone())?));
        registry.register(Arc::new(WebhookTransport::new(settings.webhook.clone())?));
        Ok(registry)
    }

    pub fn register(&mut self, transport: Arc<dyn ChannelTransport>) {
        tracing::debug!(channel = %transport.kind(), "Registered channel transport");
        self.transports.insert(transport.kind(), transport);
    }

    pub fn resolve(
        &self,
        kind: ChannelKind,
    ) -> Result<Arc<dyn ChannelTransport>, TransportError> {
        self.transports
            .get(&kind)
            .cloned()
            .ok_or(TransportError::Unconfigured(kind))
    }
}

/// HTTP client with the per-call timeout all transports are bounded by.
pub(crate) fn http_client(
    channel: ChannelKind,
    timeout_seconds: u64,
) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|source| TransportError::Request { channel, source })
}

/// Strict outcome classification used by email and SMS: any non-2xx
/// response, redirects included, is a failure.
pub(crate) fn classify_strict(
    channel: ChannelKind,
    status: StatusCode,
) -> Result<(), TransportError> {
    if status.as_u16() >= 300 {
        Err(TransportError::UpstreamStatus {
            channel,
            status: status.as_u16(),
        })
    } else {
        Ok(())
    }
}

/// Lenient classification used by webhooks only: 3xx responses count as
/// delivered, failure starts at 400.
pub(crate) fn classify_lenient(
    channel: ChannelKind,
    status: StatusCode,
) -> Result<(), TransportError> {
    if status.as_u16() >= 400 {
        Err(TransportError::UpstreamStatus {
            channel,
            status: status.as_u16(),
        })
    } else {
        Ok(())
    }
}
