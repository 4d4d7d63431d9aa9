//! Cost Ledger (C3).
//!
//! Tracks per-tenant, per-month spend and raises idempotent alerts when a
//! tenant crosses its alert fraction or its monthly limit. A tenant is
//! throttled once `current_spend_usd >= monthly_limit_usd`; the check is a
//! read of a `DashMap` entry, no locking beyond the map's own sharding.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::persistence::PersistenceLayer;

/// `YYYY-MM` bucket key for a tenant's monthly spend.
fn month_key(tenant_id: &str, at: DateTime<Utc>) -> String {
    format!("{tenant_id}#{:04}-{:02}", at.year(), at.month())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    ThresholdCrossed,
    BudgetExceeded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAlert {
    pub tenant_id: String,
    pub month: String,
    pub kind: AlertKind,
    pub current_spend_usd: f64,
    pub monthly_limit_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub tenant_id: String,
    pub model: String,
    pub cost_usd: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MonthSum {
    total_usd: f64,
    alerted_threshold: bool,
    alerted_exceeded: bool,
}

pub struct CostLedger {
    sums: DashMap<String, MonthSum>,
    history: Arc<Mutex<HashMap<String, Vec<LedgerEntry>>>>,
    alert_fraction: f64,
    persistence: Option<Arc<PersistenceLayer>>,
}

impl CostLedger {
    pub fn new(alert_fraction: f64) -> Self {
        Self {
            sums: DashMap::new(),
            history: Arc::new(Mutex::new(HashMap::new())),
            alert_fraction,
            persistence: None,
        }
    }

    /// Attaches a durable store: every `record()` call afterwards also
    /// writes its entry to SQLite in the background, best-effort, so a
    /// failed write never blocks or fails the request path.
    pub fn with_persistence(mut self, persistence: Arc<PersistenceLayer>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Whether `tenant_id` is currently throttled: spend has reached or
    /// exceeded `monthly_limit_usd` for the current month.
    pub fn is_throttled(&self, tenant_id: &str, monthly_limit_usd: f64) -> bool {
        let key = month_key(tenant_id, Utc::now());
        self.sums
            .get(&key)
            .map(|entry| entry.total_usd >= monthly_limit_usd)
            .unwrap_or(false)
    }

    pub fn current_spend(&self, tenant_id: &str) -> f64 {
        let key = month_key(tenant_id, Utc::now());
        self.sums.get(&key).map(|e| e.total_usd).unwrap_or(0.0)
    }

    /// Records spend and returns any alert newly crossed by this record.
    /// Alerts fire at most once per tenant per month per kind.
    pub fn record(
        &self,
        tenant_id: &str,
        model: &str,
        cost_usd: f64,
        monthly_limit_usd: f64,
    ) -> Option<LedgerAlert> {
        let now = Utc::now();
        let key = month_key(tenant_id, now);

        self.history
            .lock()
            .entry(key.clone())
            .or_default()
            .push(LedgerEntry {
                tenant_id: tenant_id.to_string(),
                model: model.to_string(),
                cost_usd,
                recorded_at: now,
            });

        if let Some(persistence) = self.persistence.clone() {
            let tenant_id = tenant_id.to_string();
            let model = model.to_string();
            tokio::spawn(async move {
                if let Err(err) = persistence.record_ledger_entry(&tenant_id, &model, cost_usd, now).await {
                    tracing::warn!(%err, "failed to persist ledger entry");
                }
            });
        }

        let mut entry = self.sums.entry(key.clone()).or_default();
        entry.total_usd += cost_usd;

        let threshold = monthly_limit_usd * self.alert_fraction;
        if entry.total_usd >= monthly_limit_usd && !entry.alerted_exceeded {
            entry.alerted_exceeded = true;
            return Some(LedgerAlert {
                tenant_id: tenant_id.to_string(),
                month: key,
                kind: AlertKind::BudgetExceeded,
                current_spend_usd: entry.total_usd,
                monthly_limit_usd,
            });
        }
        if entry.total_usd >= threshold && !entry.alerted_threshold {
            entry.alerted_threshold = true;
            return Some(LedgerAlert {
                tenant_id: tenant_id.to_string(),
                month: key,
                kind: AlertKind::ThresholdCrossed,
                current_spend_usd: entry.total_usd,
                monthly_limit_usd,
            });
        }
        None
    }

    /// Rejects the request up front if the tenant is already throttled.
    pub fn check_budget(&self, tenant_id: &str, monthly_limit_usd: f64) -> CoreResult<()> {
        if self.is_throttled(tenant_id, monthly_limit_usd) {
            return Err(CoreError::BudgetExceeded {
                tenant_id: tenant_id.to_string(),
                current_spend_usd: self.current_spend(tenant_id),
                monthly_limit_usd,
            });
        }
        Ok(())
    }

    /// Per-model cost breakdown for the current month.
    pub fn breakdown(&self, tenant_id: &str) -> HashMap<String, f64> {
        let key = month_key(tenant_id, Utc::now());
        let history = self.history.lock();
        let mut breakdown = HashMap::new();
        if let Some(entries) = history.get(&key) {
            for entry in entries {
                *breakdown.entry(entry.model.clone()).or_insert(0.0) += entry.cost_usd;
            }
        }
        breakdown
    }

    /// Drops month buckets older than 13 months from the current month, both
    /// from the running sums and the detail history.
    pub fn sweep_expired(&self, now: DateTime<Utc>) {
        let cutoff_ordinal = now.year() as i64 * 12 + now.month() as i64 - 13;
        self.sums.retain(|key, _| month_still_live(key, cutoff_ordinal));
        self.history
            .lock()
            .retain(|key, _| month_still_live(key, cutoff_ordinal));
    }
}

fn month_still_live(key: &str, cutoff_ordinal: i64) -> bool {
    let Some((_, month_part)) = key.split_once('#') else {
        return true;
    };
    let Some((year, month)) = month_part.split_once('-') else {
        return true;
    };
    let (Ok(year), Ok(month)) = (year.parse::<i64>(), month.parse::<i64>()) else {
        return true;
    };
    year * 12 + month >= cutoff_ordinal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_throttled_below_limit() {
        let ledger = CostLedger::new(0.8);
        ledger.record("tenant-a", "claude-haiku-4", 4.99, 5.0);
        assert!(!ledger.is_throttled("tenant-a", 5.0));
    }

    #[test]
    fn throttled_at_exact_limit() {
        let ledger = CostLedger::new(0.8);
        ledger.record("tenant-a", "claude-haiku-4", 5.0, 5.0);
        assert!(ledger.is_throttled("tenant-a", 5.0));
    }

    #[test]
    fn check_budget_rejects_once_throttled() {
        let ledger = CostLedger::new(0.8);
        ledger.record("tenant-a", "claude-haiku-4", 5.0, 5.0);
        let err = ledger.check_budget("tenant-a", 5.0).unwrap_err();
        assert!(matches!(err, CoreError::BudgetExceeded { .. }));
    }

    #[test]
    fn threshold_alert_fires_once() {
        let ledger = CostLedger::new(0.8);
        let first = ledger.record("tenant-a", "claude-haiku-4", 4.0, 5.0);
        assert!(matches!(
            first,
            Some(LedgerAlert {
                kind: AlertKind::ThresholdCrossed,
                ..
            })
        ));
        let second = ledger.record("tenant-a", "claude-haiku-4", 0.1, 5.0);
        assert!(second.is_none());
    }

    #[test]
    fn exceeded_alert_fires_once_and_supersedes_threshold() {
        let ledger = CostLedger::new(0.8);
        let alert = ledger.record("tenant-a", "claude-haiku-4", 5.5, 5.0);
        assert!(matches!(
            alert,
            Some(LedgerAlert {
                kind: AlertKind::BudgetExceeded,
                ..
            })
        ));
        let again = ledger.record("tenant-a", "claude-haiku-4", 0.1, 5.0);
        assert!(again.is_none());
    }

    #[test]
    fn breakdown_aggregates_per_model() {
        let ledger = CostLedger::new(0.8);
        ledger.record("tenant-a", "claude-haiku-4", 1.0, 100.0);
        ledger.record("tenant-a", "claude-haiku-4", 2.0, 100.0);
        ledger.record("tenant-a", "gpt-4o-mini", 0.5, 100.0);
        let breakdown = ledger.breakdown("tenant-a");
        assert_eq!(breakdown.get("claude-haiku-4"), Some(&3.0));
        assert_eq!(breakdown.get("gpt-4o-mini"), Some(&0.5));
    }

    #[test]
    fn sweep_drops_buckets_older_than_13_months() {
        let ledger = CostLedger::new(0.8);
        ledger.sums.insert(
            "tenant-a#2024-01".to_string(),
            MonthSum {
                total_usd: 10.0,
                alerted_threshold: false,
                alerted_exceeded: false,
            },
        );
        let now = DateTime::parse_from_rfc3339("2026-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ledger.sweep_expired(now);
        assert!(ledger.sums.get("tenant-a#2024-01").is_none());
    }
}
