//! Email transport over a Mailtrap-style sending API.

use async_trait::async_trait;
use serde_json::json;

use crate::config::EmailConfig;
use crate::error::TransportError;
use crate::notification::ChannelKind;

use super::{classify_strict, http_client, ChannelTransport, DeliveryJob};

/// Sends single-recipient messages through an HTTP email API with bearer
/// token auth.
pub struct EmailTransport {
    config: EmailConfig,
    client: reqwest::Client,
}

impl EmailTransport {
    pub fn new(config: EmailConfig) -> Result<Self, TransportError> {
        let client = http_client(ChannelKind::Email, config.timeout_seconds)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ChannelTransport for EmailTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn deliver(&self, job: &DeliveryJob) -> Result<(), TransportError> {
        if self.config.api_token.is_empty() || self.config.from_email.is_empty() {
            return Err(TransportError::MissingCredentials {
                channel: ChannelKind::Email,
            });
        }

        let subject = job
            .subject
            .as_deref()
            .unwrap_or(&self.config.default_subject);

        let payload = json!({
            "from": {
                "email": self.config.from_email,
                "name": self.config.from_name,
            },
            "to": [{ "email": job.recipient }],
            "subject": subject,
            "text": job.body,
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                channel: ChannelKind::Email,
                source,
            })?;

        classify_strict(ChannelKind::Email, response.status())
    }
}
