//! Core notification types: channel kinds, delivery requests and records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AdmissionError;

/// The delivery mechanism for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
    Webhook,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(ChannelKind::Email),
            "sms" => Ok(ChannelKind::Sms),
            "webhook" => Ok(ChannelKind::Webhook),
            other => Err(AdmissionError::InvalidChannel(other.to_string())),
        }
    }
}

/// Lifecycle state of a delivery record.
///
/// `Pending` is entered exactly once at creation; `Sent` and `Failed` are
/// terminal and reached by the single reconciliation write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!("unknown delivery status: {}", other)),
        }
    }
}

/// A caller-supplied request to deliver one notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub tenant_id: Uuid,
    pub channel: ChannelKind,
    /// Recipient address. Semantics depend on the channel: an email address,
    /// a phone number, or (for webhooks) an optional override target URL.
    pub recipient: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub body: String,
}

impl DeliveryRequest {
    /// Validate the request at the admission boundary.
    ///
    /// A webhook recipient may be empty (the tenant's default target is used
    /// instead), but when present it must be an http(s) URL.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        if self.body.trim().is_empty() {
            return Err(AdmissionError::EmptyBody);
        }

        match self.channel {
            ChannelKind::Email => {
                if self.recipient.trim().is_empty() || !self.recipient.contains('@') {
                    return Err(AdmissionError::InvalidRecipient {
                        channel: self.channel,
                        reason: "expected an email address".to_string(),
                    });
                }
            }
            ChannelKind::Sms => {
                if self.recipient.trim().is_empty() {
                    return Err(AdmissionError::InvalidRecipient {
                        channel: self.channel,
                        reason: "expected a phone number".to_string(),
                    });
                }
            }
            ChannelKind::Webhook => {
                if !self.recipient.is_empty() {
                    let parsed = url::Url::parse(&self.recipient).map_err(|e| {
                        AdmissionError::InvalidRecipient {
                            channel: self.channel,
                            reason: e.to_string(),
                        }
                    })?;
                    if parsed.scheme() != "http" && parsed.scheme() != "https" {
                        return Err(AdmissionError::InvalidRecipient {
                            channel: self.channel,
                            reason: format!("unsupported scheme: {}", parsed.scheme()),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

/// The fields the engine hands to the store when creating a record.
/// The store assigns the id, initial status and timestamps.
#[derive(Debug, Clone)]
pub struct NewDeliveryRecord {
    pub tenant_id: Uuid,
    pub channel: ChannelKind,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
}

impl NewDeliveryRecord {
    pub fn from_request(request: &DeliveryRequest) -> Self {
        Self {
            tenant_id: request.tenant_id,
            channel: request.channel,
            recipient: request.recipient.clone(),
            subject: request.subject.clone(),
            body: request.body.clone(),
        }
    }
}

/// A durable notification attempt, the only persisted artifact owned by
/// this engine.
///
/// Exactly one of the following holds at any time: pending with no
/// timestamps, sent with `sent_at`, or failed with `error_detail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub channel: ChannelKind,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: DeliveryStatus,
    pub error_detail: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Monotonically non-decreasing attempt counter. Recorded on failure,
    /// never incremented automatically (no retry scheduler).
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
