//! Per-tenant quota tracking.
//!
//! Quota is derived state: rolling daily/monthly consumption is computed on
//! demand from Sent delivery records, compared against the tenant's limits.
//! The check itself is a pure query; the actual "consumption" is the
//! creation of the Pending record by the dispatch engine. That makes the
//! read eventually consistent with in-flight deliveries: a concurrent burst
//! can transiently exceed the daily limit, which is accepted behavior.

use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

use crate::error::{AdmissionError, StoreError};
use crate::notification::DeliveryStatus;
use crate::store::DeliveryStore;
use crate::tenant::Tenant;

/// Outcome of an admission-time quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied(AdmissionError),
}

/// Usage statistics reported to tenants.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub sent_today: u64,
    pub sent_this_month: u64,
    pub daily_limit: i64,
    pub monthly_limit: i64,
    pub remaining_today: i64,
    pub remaining_this_month: i64,
    pub percentage_today: f64,
    pub percentage_this_month: f64,
    /// Start of the current UTC day, when the daily window last reset.
    pub last_reset: DateTime<Utc>,
}

/// Read-side quota computation over the delivery record store.
pub struct QuotaTracker {
    store: Arc<dyn DeliveryStore>,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn DeliveryStore>) -> Self {
        Self { store }
    }

    /// Admission check for one more delivery on behalf of `tenant`.
    ///
    /// Gates on both the daily and the monthly limit. Limits are expected
    /// to be positive; a zero or negative limit admits nothing, so a
    /// misconfigured tenant fails closed rather than unmetered.
    pub async fn check(&self, tenant: &Tenant) -> Result<QuotaDecision, StoreError> {
        let now = Utc::now();

        let sent_today = self
            .store
            .count_by_status_since(tenant.id, DeliveryStatus::Sent, start_of_day(now))
            .await?;
        if sent_today >= effective_limit(tenant.daily_limit) {
            return Ok(QuotaDecision::Denied(AdmissionError::DailyLimitExceeded {
                sent: sent_today,
                limit: tenant.daily_limit,
            }));
        }

        let sent_this_month = self
            .store
            .count_by_status_since(tenant.id, DeliveryStatus::Sent, start_of_month(now))
            .await?;
        if sent_this_month >= effective_limit(tenant.monthly_limit) {
            return Ok(QuotaDecision::Denied(
                AdmissionError::MonthlyLimitExceeded {
                    sent: sent_this_month,
                    limit: tenant.monthly_limit,
                },
            ));
        }

        Ok(QuotaDecision::Allowed)
    }

    /// Usage report for the tenant's current daily and monthly windows.
    pub async fn usage(&self, tenant: &Tenant) -> Result<UsageReport, StoreError> {
        let now = Utc::now();
        let day_start = start_of_day(now);

        let sent_today = self
            .store
            .count_by_status_since(tenant.id, DeliveryStatus::Sent, day_start)
            .await?;
        let sent_this_month = self
            .store
            .count_by_status_since(tenant.id, DeliveryStatus::Sent, start_of_month(now))
            .await?;

        Ok(UsageReport {
            sent_today,
            sent_this_month,
            daily_limit: tenant.daily_limit,
            monthly_limit: tenant.monthly_limit,
            remaining_today: remaining(sent_today, tenant.daily_limit),
            remaining_this_month: remaining(sent_this_month, tenant.monthly_limit),
            percentage_today: percentage(sent_today, tenant.daily_limit),
            percentage_this_month: percentage(sent_this_month, tenant.monthly_limit),
            last_reset: day_start,
        })
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now)
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Limit as an admission threshold. Negative values clamp to zero instead
/// of wrapping, so a corrupted limit denies rather than admits.
fn effective_limit(limit: i64) -> u64 {
    u64::try_from(limit).unwrap_or(0)
}

fn remaining(sent: u64, limit: i64) -> i64 {
    (limit - sent as i64).max(0)
}

fn percentage(sent: u64, limit: i64) -> f64 {
    if limit <= 0 {
        return 0.0;
    }
    (sent as f64 / limit as f64) * 100.0
}
