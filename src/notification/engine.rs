//! Dispatch engine: admission, persistence and asynchronous delivery.
//!
//! The synchronous path validates the request, checks quota, persists a
//! Pending record and acknowledges the caller. Delivery itself runs on a
//! bounded worker pool; each worker resolves the channel transport, performs
//! the network call and reconciles the outcome back into the store. The ack
//! always precedes the terminal transition, so a status query issued right
//! after submitting may legitimately observe Pending.
//!
//! Every ack carries a [`DeliveryReceipt`] that resolves once reconciliation
//! has been written, which lets callers (and tests) await completion
//! deterministically instead of racing a detached task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::error::{AdmissionError, EngineError, Result};
use crate::metrics;
use crate::quota::{QuotaDecision, QuotaTracker, UsageReport};
use crate::store::{DeliveryStore, StatusUpdate};
use crate::tenant::{TenantDirectory, TenantLookupError};
use crate::transport::{DeliveryJob, TransportRegistry};

use super::types::{
    ChannelKind, DeliveryRecord, DeliveryRequest, DeliveryStatus, NewDeliveryRecord,
};

/// Terminal outcome of one delivery attempt, as observed through a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

/// Completion signal for a submitted delivery.
///
/// Resolves after the reconciliation write for the record has been
/// attempted. `None` means the engine dropped the job without reconciling,
/// which only happens if a worker panicked.
#[derive(Debug)]
pub struct DeliveryReceipt {
    rx: oneshot::Receiver<DeliveryOutcome>,
}

impl DeliveryReceipt {
    pub async fn settled(self) -> Option<DeliveryOutcome> {
        self.rx.await.ok()
    }
}

/// Synchronous acknowledgement returned by [`DispatchEngine::submit`].
#[derive(Debug)]
pub struct SubmitAck {
    pub record_id: Uuid,
    pub status: DeliveryStatus,
    pub receipt: DeliveryReceipt,
}

/// Engine counters (admission and reconciliation paths).
#[derive(Debug, Default)]
struct EngineStats {
    submitted: AtomicU64,
    quota_denied: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl EngineStats {
    fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            quota_denied: self.quota_denied.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatsSnapshot {
    pub submitted: u64,
    pub quota_denied: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// A queued delivery with its completion signal.
struct Job {
    payload: DeliveryJob,
    done: oneshot::Sender<DeliveryOutcome>,
}

/// Everything a delivery worker needs; shares no mutable state with other
/// workers beyond the store handle.
#[derive(Clone)]
struct WorkerContext {
    store: Arc<dyn DeliveryStore>,
    transports: Arc<TransportRegistry>,
    stats: Arc<EngineStats>,
}

/// Orchestrates validation, quota admission, persistence and asynchronous
/// channel delivery.
pub struct DispatchEngine {
    store: Arc<dyn DeliveryStore>,
    tenants: Arc<dyn TenantDirectory>,
    quota: QuotaTracker,
    /// Taken on shutdown; a drained sender means no further jobs are
    /// accepted.
    job_tx: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<EngineStats>,
}

impl DispatchEngine {
    /// Create the engine and start its delivery workers.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        config: DispatcherConfig,
        store: Arc<dyn DeliveryStore>,
        tenants: Arc<dyn TenantDirectory>,
        transports: Arc<TransportRegistry>,
    ) -> Self {
        let (job_tx, job_rx) = mpsc::channel(config.queue_depth.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));
        let stats = Arc::new(EngineStats::default());

        let ctx = WorkerContext {
            store: store.clone(),
            transports,
            stats: stats.clone(),
        };

        let worker_count = config.workers.max(1);
        let workers = (0..worker_count)
            .map(|worker_id| {
                let ctx = ctx.clone();
                let job_rx = job_rx.clone();
                tokio::spawn(run_worker(worker_id, ctx, job_rx))
            })
            .collect();

        tracing::info!(
            workers = worker_count,
            queue_depth = config.queue_depth.max(1),
            "Dispatch engine started"
        );

        Self {
            store,
            tenants,
            quota: QuotaTracker::new(ctx.store),
            job_tx: Mutex::new(Some(job_tx)),
            workers: Mutex::new(workers),
            stats,
        }
    }

    /// Submit a delivery request.
    ///
    /// Admission failures return synchronously and create no record. On
    /// admission the record is persisted as Pending, the delivery job is
    /// queued, and the ack is returned without waiting for the transport.
    #[tracing::instrument(
        name = "engine.submit",
        skip(self, request),
        fields(tenant_id = %request.tenant_id, channel = %request.channel)
    )]
    pub async fn submit(&self, request: DeliveryRequest) -> Result<SubmitAck> {
        request.validate()?;

        let tenant = match self.tenants.get_tenant(request.tenant_id).await {
            Ok(tenant) => tenant,
            Err(TenantLookupError::NotFound) => {
                return Err(AdmissionError::TenantNotFound.into())
            }
            Err(TenantLookupError::Store(e)) => return Err(EngineError::Store(e)),
        };

        if !tenant.is_active {
            return Err(AdmissionError::TenantInactive.into());
        }

        match self.quota.check(&tenant).await? {
            QuotaDecision::Allowed => {}
            QuotaDecision::Denied(reason) => {
                self.stats.quota_denied.fetch_add(1, Ordering::Relaxed);
                metrics::QUOTA_DENIED_TOTAL.inc();
                tracing::info!(
                    tenant_id = %tenant.id,
                    reason = %reason,
                    "Delivery request denied by quota"
                );
                return Err(reason.into());
            }
        }

        let record = self
            .store
            .create(NewDeliveryRecord::from_request(&request))
            .await?;

        // Webhook targets resolve at admission time while the tenant is at
        // hand: request override first, tenant default second.
        let webhook_url = match record.channel {
            ChannelKind::Webhook => {
                if record.recipient.is_empty() {
                    tenant.default_webhook_url.clone()
                } else {
                    Some(record.recipient.clone())
                }
            }
            _ => None,
        };

        let (done_tx, done_rx) = oneshot::channel();
        let job = Job {
            payload: DeliveryJob {
                record_id: record.id,
                tenant_id: record.tenant_id,
                channel: record.channel,
                recipient: record.recipient.clone(),
                subject: record.subject.clone(),
                body: record.body.clone(),
                webhook_url,
                retry_count: record.retry_count,
            },
            done: done_tx,
        };

        let sender = self.job_tx.lock().await.clone();
        let rejected = match sender {
            Some(tx) => tx.send(job).await.err().map(|e| e.0),
            None => Some(job),
        };
        if let Some(job) = rejected {
            // Engine is shutting down. The record exists, so reconcile it
            // inline as failed rather than leaving it pending forever.
            tracing::error!(
                record_id = %record.id,
                "Dispatch queue closed, recording delivery failure"
            );
            if let Err(e) = self
                .store
                .update_status(
                    record.id,
                    StatusUpdate::Failed {
                        error_detail: "dispatch engine is shut down".to_string(),
                        retry_count: record.retry_count,
                    },
                )
                .await
            {
                tracing::error!(record_id = %record.id, error = %e, "Failed to persist failed status");
            }
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            let _ = job.done.send(DeliveryOutcome::Failed);
        }

        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        metrics::SUBMITTED_TOTAL.inc();

        tracing::debug!(
            record_id = %record.id,
            tenant_id = %record.tenant_id,
            channel = %record.channel,
            "Delivery request admitted and queued"
        );

        Ok(SubmitAck {
            record_id: record.id,
            status: DeliveryStatus::Pending,
            receipt: DeliveryReceipt { rx: done_rx },
        })
    }

    /// Tenant-scoped status lookup. Records belonging to another tenant
    /// resolve as not found, never as a cross-tenant leak.
    pub async fn get_status(&self, record_id: Uuid, tenant_id: Uuid) -> Result<DeliveryRecord> {
        self.store
            .find(record_id, tenant_id)
            .await?
            .ok_or(EngineError::NotFound(record_id))
    }

    /// Usage statistics for a tenant's current daily and monthly windows.
    pub async fn get_usage(&self, tenant_id: Uuid) -> Result<UsageReport> {
        let tenant = match self.tenants.get_tenant(tenant_id).await {
            Ok(tenant) => tenant,
            Err(TenantLookupError::NotFound) => {
                return Err(AdmissionError::TenantNotFound.into())
            }
            Err(TenantLookupError::Store(e)) => return Err(EngineError::Store(e)),
        };
        Ok(self.quota.usage(&tenant).await?)
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting jobs, drain the queue and join the workers.
    pub async fn shutdown(&self) {
        let sender = self.job_tx.lock().await.take();
        drop(sender);

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Delivery worker terminated abnormally");
            }
        }

        tracing::info!("Dispatch engine shut down");
    }
}

async fn run_worker(
    worker_id: usize,
    ctx: WorkerContext,
    job_rx: Arc<Mutex<mpsc::Receiver<Job>>>,
) {
    loop {
        // Hold the receiver lock only while waiting for the next job so the
        // pool drains concurrently.
        let job = { job_rx.lock().await.recv().await };
        let Some(job) = job else { break };

        let outcome = reconcile(&ctx, &job.payload).await;
        let _ = job.done.send(outcome);
    }
    tracing::debug!(worker_id, "Delivery worker stopped");
}

/// Deliver the payload and write the terminal status.
///
/// Transport failures are recorded, never propagated: nothing observes an
/// unhandled error from a delivery task. A store failure here is logged at
/// error level so the outcome is not silently dropped.
async fn reconcile(ctx: &WorkerContext, payload: &DeliveryJob) -> DeliveryOutcome {
    let result = match ctx.transports.resolve(payload.channel) {
        Ok(transport) => transport.deliver(payload).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            let sent_at = Utc::now();
            if let Err(e) = ctx
                .store
                .update_status(payload.record_id, StatusUpdate::Sent { sent_at })
                .await
            {
                metrics::RECONCILE_WRITE_ERRORS_TOTAL.inc();
                tracing::error!(
                    record_id = %payload.record_id,
                    error = %e,
                    "Failed to persist sent status"
                );
            }
            ctx.stats.delivered.fetch_add(1, Ordering::Relaxed);
            metrics::DELIVERED_TOTAL
                .with_label_values(&[payload.channel.as_str()])
                .inc();

            tracing::info!(
                record_id = %payload.record_id,
                tenant_id = %payload.tenant_id,
                channel = %payload.channel,
                "Notification delivered"
            );
            DeliveryOutcome::Sent
        }
        Err(e) => {
            let detail = e.to_string();
            if let Err(store_err) = ctx
                .store
                .update_status(
                    payload.record_id,
                    StatusUpdate::Failed {
                        error_detail: detail.clone(),
                        retry_count: payload.retry_count,
                    },
                )
                .await
            {
                metrics::RECONCILE_WRITE_ERRORS_TOTAL.inc();
                tracing::error!(
                    record_id = %payload.record_id,
                    error = %store_err,
                    "Failed to persist failed status"
                );
            }
            ctx.stats.failed.fetch_add(1, Ordering::Relaxed);
            metrics::FAILED_TOTAL
                .with_label_values(&[payload.channel.as_str()])
                .inc();

            tracing::warn!(
                record_id = %payload.record_id,
                tenant_id = %payload.tenant_id,
                channel = %payload.channel,
                error = %detail,
                "Notification delivery failed"
            );
            DeliveryOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::store::MemoryDeliveryStore;
    use crate::tenant::{MemoryTenantDirectory, Tenant};
    use crate::transport::ChannelTransport;
    use async_trait::async_trait;

    /// Transport that always reports the given outcome.
    struct FixedTransport {
        kind: ChannelKind,
        succeed: bool,
    }

    #[async_trait]
    impl ChannelTransport for FixedTransport {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn deliver(&self, _job: &DeliveryJob) -> std::result::Result<(), TransportError> {
            if self.succeed {
                Ok(())
            } else {
                Err(TransportError::UpstreamStatus {
                    channel: self.kind,
                    status: 503,
                })
            }
        }
    }

    struct Harness {
        engine: DispatchEngine,
        tenant_id: Uuid,
    }

    fn harness(succeed: bool) -> Harness {
        let store = Arc::new(MemoryDeliveryStore::new());
        let tenants = Arc::new(MemoryTenantDirectory::new());
        let tenant = Tenant::new(Uuid::new_v4(), "acme");
        let tenant_id = tenant.id;
        tenants.insert(tenant);

        let mut registry = TransportRegistry::new();
        registry.register(Arc::new(FixedTransport {
            kind: ChannelKind::Email,
            succeed,
        }));

        let engine = DispatchEngine::new(
            DispatcherConfig::default(),
            store,
            tenants,
            Arc::new(registry),
        );
        Harness { engine, tenant_id }
    }

    fn email_request(tenant_id: Uuid) -> DeliveryRequest {
        DeliveryRequest {
            tenant_id,
            channel: ChannelKind::Email,
            recipient: "user@example.com".to_string(),
            subject: Some("greetings".to_string()),
            body: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_acks_pending_then_reconciles_sent() {
        let h = harness(true);
        let ack = h.engine.submit(email_request(h.tenant_id)).await.unwrap();
        assert_eq!(ack.status, DeliveryStatus::Pending);

        let outcome = ack.receipt.settled().await;
        assert_eq!(outcome, Some(DeliveryOutcome::Sent));

        let record = h.engine.get_status(ack.record_id, h.tenant_id).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Sent);
        assert!(record.sent_at.is_some());
        assert!(record.error_detail.is_none());
    }

    #[tokio::test]
    async fn test_submit_reconciles_failure_with_detail() {
        let h = harness(false);
        let ack = h.engine.submit(email_request(h.tenant_id)).await.unwrap();
        assert_eq!(ack.receipt.settled().await, Some(DeliveryOutcome::Failed));

        let record = h.engine.get_status(ack.record_id, h.tenant_id).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Failed);
        assert_eq!(
            record.error_detail.as_deref(),
            Some("email delivery rejected upstream: status 503")
        );
        assert_eq!(record.retry_count, 0);
        assert!(record.sent_at.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_denied_without_record() {
        let h = harness(true);
        let err = h.engine.submit(email_request(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Admission(AdmissionError::TenantNotFound)
        ));
        assert_eq!(h.engine.stats().submitted, 0);
    }

    #[tokio::test]
    async fn test_inactive_tenant_is_denied() {
        let store = Arc::new(MemoryDeliveryStore::new());
        let tenants = Arc::new(MemoryTenantDirectory::new());
        let mut tenant = Tenant::new(Uuid::new_v4(), "dormant");
        tenant.is_active = false;
        let tenant_id = tenant.id;
        tenants.insert(tenant);

        let engine = DispatchEngine::new(
            DispatcherConfig::default(),
            store,
            tenants,
            Arc::new(TransportRegistry::new()),
        );

        let err = engine.submit(email_request(tenant_id)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Admission(AdmissionError::TenantInactive)
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_channel_fails_at_reconciliation() {
        let store = Arc::new(MemoryDeliveryStore::new());
        let tenants = Arc::new(MemoryTenantDirectory::new());
        let tenant = Tenant::new(Uuid::new_v4(), "acme");
        let tenant_id = tenant.id;
        tenants.insert(tenant);

        // Empty registry: admission still succeeds, delivery fails async.
        let engine = DispatchEngine::new(
            DispatcherConfig::default(),
            store,
            tenants,
            Arc::new(TransportRegistry::new()),
        );

        let ack = engine.submit(email_request(tenant_id)).await.unwrap();
        assert_eq!(ack.status, DeliveryStatus::Pending);
        assert_eq!(ack.receipt.settled().await, Some(DeliveryOutcome::Failed));

        let record = engine.get_status(ack.record_id, tenant_id).await.unwrap();
        assert_eq!(
            record.error_detail.as_deref(),
            Some("no transport configured for email channel")
        );
    }

    #[tokio::test]
    async fn test_get_status_is_tenant_scoped() {
        let h = harness(true);
        let ack = h.engine.submit(email_request(h.tenant_id)).await.unwrap();

        let err = h
            .engine
            .get_status(ack.record_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight_work() {
        let h = harness(true);
        let ack = h.engine.submit(email_request(h.tenant_id)).await.unwrap();
        h.engine.shutdown().await;

        // The queued job was reconciled before the workers stopped.
        assert_eq!(ack.receipt.settled().await, Some(DeliveryOutcome::Sent));

        // Submissions after shutdown settle as failed, not lost.
        let ack = h.engine.submit(email_request(h.tenant_id)).await.unwrap();
        assert_eq!(ack.receipt.settled().await, Some(DeliveryOutcome::Failed));
        let record = h.engine.get_status(ack.record_id, h.tenant_id).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn test_stats_track_outcomes() {
        let h = harness(true);
        let ack = h.engine.submit(email_request(h.tenant_id)).await.unwrap();
        ack.receipt.settled().await;

        let stats = h.engine.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 0);
    }
}
