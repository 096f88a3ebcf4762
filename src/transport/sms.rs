//! SMS transport over a Twilio-style messages API.

use async_trait::async_trait;

use crate::config::SmsConfig;
use crate::error::TransportError;
use crate::notification::ChannelKind;

use super::{classify_strict, http_client, ChannelTransport, DeliveryJob};

/// Posts form-encoded messages to the account's messages endpoint with
/// basic auth.
pub struct SmsTransport {
    config: SmsConfig,
    client: reqwest::Client,
}

impl SmsTransport {
    pub fn new(config: SmsConfig) -> Result<Self, TransportError> {
        let client = http_client(ChannelKind::Sms, config.timeout_seconds)?;
        Ok(Self { config, client })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl ChannelTransport for SmsTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn deliver(&self, job: &DeliveryJob) -> Result<(), TransportError> {
        if self.config.account_sid.is_empty()
            || self.config.auth_token.is_empty()
            || self.config.from_number.is_empty()
        {
            return Err(TransportError::MissingCredentials {
                channel: ChannelKind::Sms,
            });
        }

        let params = [
            ("To", job.recipient.as_str()),
            ("From", self.config.from_number.as_str()),
            ("Body", job.body.as_str()),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                channel: ChannelKind::Sms,
                source,
            })?;

        classify_strict(ChannelKind::Sms, response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn config() -> SmsConfig {
        SmsConfig {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            from_number: "+15550001111".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_messages_url() {
        let transport = SmsTransport::new(config()).unwrap();
        assert_eq!(
            transport.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let transport = SmsTransport::new(SmsConfig::default()).unwrap();
        let job = DeliveryJob {
            record_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            channel: ChannelKind::Sms,
            recipient: "+15551234567".to_string(),
            subject: None,
            body: "hello".to_string(),
            webhook_url: None,
            retry_count: 0,
        };
        assert!(matches!(
            transport.deliver(&job).await,
            Err(TransportError::MissingCredentials { .. })
        ));
    }
}
