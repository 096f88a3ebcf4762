//! Transport protocol tests against a local HTTP server.
//!
//! A minimal listener answers every request with a fixed status code, which
//! pins down the per-channel success thresholds: email and SMS fail from
//! 300 up, webhooks only from 400 up.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use uuid::Uuid;

use courier_dispatch::config::{DispatcherConfig, EmailConfig, SmsConfig, WebhookConfig};
use courier_dispatch::error::TransportError;
use courier_dispatch::notification::{
    ChannelKind, DeliveryOutcome, DeliveryRequest, DeliveryStatus, DispatchEngine,
};
use courier_dispatch::store::MemoryDeliveryStore;
use courier_dispatch::tenant::{MemoryTenantDirectory, Tenant};
use courier_dispatch::transport::{
    ChannelTransport, DeliveryJob, EmailTransport, SmsTransport, TransportRegistry,
    WebhookTransport,
};

/// Serve every incoming request with the given status code. Returns the
/// base URL of the listener.
async fn fixed_status_server(status: u16) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let mut read = 0;

                // Read the full request: headers, then content-length bytes
                // of body, so the client never sees a reset mid-write.
                let header_end = loop {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) => return,
                        Ok(n) => {
                            read += n;
                            if let Some(pos) =
                                buf[..read].windows(4).position(|w| w == b"\r\n\r\n")
                            {
                                break pos + 4;
                            }
                            if read == buf.len() {
                                return;
                            }
                        }
                        Err(_) => return,
                    }
                };

                let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);

                let mut body_read = read - header_end;
                let mut sink = vec![0u8; 4096];
                while body_read < content_length {
                    match socket.read(&mut sink).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => body_read += n,
                    }
                }

                let response = format!(
                    "HTTP/1.1 {} Fixed\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

fn webhook_job(url: Option<String>) -> DeliveryJob {
    DeliveryJob {
        record_id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        channel: ChannelKind::Webhook,
        recipient: String::new(),
        subject: None,
        body: "payload".to_string(),
        webhook_url: url,
        retry_count: 0,
    }
}

fn email_config(api_url: String) -> EmailConfig {
    EmailConfig {
        api_token: "test-token".to_string(),
        from_email: "noreply@example.com".to_string(),
        api_url,
        ..Default::default()
    }
}

fn sms_config(api_base: String) -> SmsConfig {
    SmsConfig {
        account_sid: "AC123".to_string(),
        auth_token: "secret".to_string(),
        from_number: "+15550001111".to_string(),
        api_base,
        ..Default::default()
    }
}

fn email_job(recipient: &str) -> DeliveryJob {
    DeliveryJob {
        record_id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        channel: ChannelKind::Email,
        recipient: recipient.to_string(),
        subject: Some("greetings".to_string()),
        body: "hello".to_string(),
        webhook_url: None,
        retry_count: 0,
    }
}

#[tokio::test]
async fn webhook_treats_399_as_success() {
    let url = fixed_status_server(399).await;
    let transport = WebhookTransport::new(WebhookConfig::default()).unwrap();
    assert!(transport.deliver(&webhook_job(Some(url))).await.is_ok());
}

#[tokio::test]
async fn webhook_treats_400_as_failure() {
    let url = fixed_status_server(400).await;
    let transport = WebhookTransport::new(WebhookConfig::default()).unwrap();
    let err = transport
        .deliver(&webhook_job(Some(url)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::UpstreamStatus {
            channel: ChannelKind::Webhook,
            status: 400
        }
    ));
}

#[tokio::test]
async fn webhook_accepts_2xx() {
    let url = fixed_status_server(204).await;
    let transport = WebhookTransport::new(WebhookConfig::default()).unwrap();
    assert!(transport.deliver(&webhook_job(Some(url))).await.is_ok());
}

#[tokio::test]
async fn email_treats_300_as_failure() {
    let url = fixed_status_server(300).await;
    let transport = EmailTransport::new(email_config(url)).unwrap();
    let err = transport
        .deliver(&email_job("user@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::UpstreamStatus {
            channel: ChannelKind::Email,
            status: 300
        }
    ));
}

#[tokio::test]
async fn email_accepts_2xx() {
    let url = fixed_status_server(200).await;
    let transport = EmailTransport::new(email_config(url)).unwrap();
    assert!(transport.deliver(&email_job("user@example.com")).await.is_ok());
}

#[tokio::test]
async fn sms_treats_300_as_failure() {
    let base = fixed_status_server(300).await;
    let transport = SmsTransport::new(sms_config(base)).unwrap();

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

    let err = transport.deliver(&job).await.unwrap_err();
    assert!(matches!(
        err,
        TransportError::UpstreamStatus {
            channel: ChannelKind::Sms,
            status: 300
        }
    ));
}

#[tokio::test]
async fn connection_failure_surfaces_as_request_error() {
    // Nothing listens on this port; bind and drop to find a free one.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let transport = WebhookTransport::new(WebhookConfig::default()).unwrap();
    let err = transport
        .deliver(&webhook_job(Some(url)))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Request { .. }));
}

#[tokio::test]
async fn engine_delivers_webhook_to_tenant_default_target() {
    // Full engine pass: empty recipient resolves to the tenant's default
    // webhook URL and the delivery lands Sent.
    let url = fixed_status_server(200).await;

    let store = Arc::new(MemoryDeliveryStore::new());
    let tenants = Arc::new(MemoryTenantDirectory::new());
    let mut tenant = Tenant::new(Uuid::new_v4(), "acme");
    tenant.default_webhook_url = Some(url);
    let tenant_id = tenant.id;
    tenants.insert(tenant);

    let mut registry = TransportRegistry::new();
    registry.register(Arc::new(
        WebhookTransport::new(WebhookConfig::default()).unwrap(),
    ));

    let engine = DispatchEngine::new(
        DispatcherConfig::default(),
        store,
        tenants,
        Arc::new(registry),
    );

    let ack = engine
        .submit(DeliveryRequest {
            tenant_id,
            channel: ChannelKind::Webhook,
            recipient: String::new(),
            subject: None,
            body: "ping".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(ack.receipt.settled().await, Some(DeliveryOutcome::Sent));
    let record = engine.get_status(ack.record_id, tenant_id).await.unwrap();
    assert_eq!(record.status, DeliveryStatus::Sent);
}
