//! Generic webhook transport.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::config::WebhookConfig;
use crate::error::TransportError;
use crate::notification::ChannelKind;

use super::{classify_lenient, http_client, ChannelTransport, DeliveryJob};

/// Posts a JSON payload to the job's resolved target URL.
///
/// The target was resolved at admission time: the request's override URL
/// when present, otherwise the tenant's configured default. Redirect-range
/// responses count as delivered for this channel only.
pub struct WebhookTransport {
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(config: WebhookConfig) -> Result<Self, TransportError> {
        let client = http_client(ChannelKind::Webhook, config.timeout_seconds)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChannelTransport for WebhookTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn deliver(&self, job: &DeliveryJob) -> Result<(), TransportError> {
        let url = job
            .webhook_url
            .as_deref()
            .ok_or(TransportError::MissingWebhookUrl)?;

        let payload = json!({
            "message": job.body,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                channel: ChannelKind::Webhook,
                source,
            })?;

        classify_lenient(ChannelKind::Webhook, response.status())
    }
}
