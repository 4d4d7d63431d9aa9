//! Performance Monitor (C12).
//!
//! Aggregates ledger, cache, and task-history data into a budget dashboard,
//! per-agent operational metrics, a deterministic health status, and
//! severity-tiered alerts. Thresholds are fixed rather than configurable so
//! dashboards read the same way across tenants.

use std::sync::Arc;

use serde::Serialize;

use crate::agents::AgentType;
use crate::cache::CacheMetrics;
use crate::history::TaskHistory;
use crate::ledger::CostLedger;

/// Error rate above which an agent or the system is considered critical.
const CRITICAL_ERROR_RATE: f64 = 0.25;
/// Error rate above which an agent or the system is considered degraded.
const DEGRADED_ERROR_RATE: f64 = 0.05;
/// Mean response time above which an agent or the system is critical.
const CRITICAL_RESPONSE_MS: f64 = 15_000.0;
/// Mean response time above which an agent or the system is degraded.
const DEGRADED_RESPONSE_MS: f64 = 5_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorAlert {
    pub severity: AlertSeverity,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardSnapshot {
    pub tenant_id: String,
    pub current_spend_usd: f64,
    pub monthly_limit_usd: f64,
    pub spend_fraction: f64,
    pub cache_hit_rate: f64,
    pub health: HealthStatus,
    pub projected_month_end_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentMetrics {
    pub agent_type: AgentType,
    pub requests: u64,
    pub error_rate: f64,
    pub avg_response_ms: f64,
    pub total_cost_usd: f64,
    pub health: HealthStatus,
}

/// Relative standing of two agents by error rate then response time.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentComparison {
    pub leader: AgentType,
    pub trailer: AgentType,
    pub error_rate_delta: f64,
    pub avg_response_ms_delta: f64,
}

#[derive(Debug, Serialize)]
pub struct PerformanceReport {
    pub dashboard: DashboardSnapshot,
    pub agent_metrics: Vec<AgentMetrics>,
    pub alerts: Vec<MonitorAlert>,
}

pub struct PerformanceMonitor {
    ledger: Arc<CostLedger>,
    history: Arc<TaskHistory>,
}

impl PerformanceMonitor {
    pub fn new(ledger: Arc<CostLedger>, history: Arc<TaskHistory>) -> Self {
        Self { ledger, history }
    }

    /// `error_rate > 0.05` or `avg_response_ms > 5000` -> `Degraded`;
    /// `error_rate > 0.25` or `avg_response_ms > 15000` -> `Critical`;
    /// otherwise `Healthy`.
    pub fn health_status(&self, error_rate: f64, avg_response_ms: f64) -> HealthStatus {
        if error_rate > CRITICAL_ERROR_RATE || avg_response_ms > CRITICAL_RESPONSE_MS {
            HealthStatus::Critical
        } else if error_rate > DEGRADED_ERROR_RATE || avg_response_ms > DEGRADED_RESPONSE_MS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Linear projection: `current_spend / day_of_month * days_in_month`.
    pub fn project_month_end(&self, current_spend_usd: f64, day_of_month: u32, days_in_month: u32) -> f64 {
        if day_of_month == 0 {
            return current_spend_usd;
        }
        current_spend_usd / day_of_month as f64 * days_in_month as f64
    }

    /// Per-agent-type request volume, error rate, mean response time, and
    /// health, rolled up from task history across every tenant.
    pub fn agent_metrics(&self) -> Vec<AgentMetrics> {
        self.history
            .agent_stats()
            .into_iter()
            .map(|stats| {
                let error_rate = stats.error_rate();
                AgentMetrics {
                    agent_type: stats.agent_type,
                    requests: stats.requests,
                    error_rate,
                    avg_response_ms: stats.avg_execution_ms,
                    total_cost_usd: stats.total_cost_usd,
                    health: self.health_status(error_rate, stats.avg_execution_ms),
                }
            })
            .collect()
    }

    /// Compares two agent types head-to-head on error rate first, mean
    /// response time as the tiebreaker. Returns `None` if either has no
    /// recorded history.
    pub fn compare_agents(&self, a: AgentType, b: AgentType) -> Option<AgentComparison> {
        let metrics = self.agent_metrics();
        let stat_a = metrics.iter().find(|m| m.agent_type == a)?;
        let stat_b = metrics.iter().find(|m| m.agent_type == b)?;

        let a_better = (stat_a.error_rate, stat_a.avg_response_ms) <= (stat_b.error_rate, stat_b.avg_response_ms);
        let (leader, trailer) = if a_better { (a, b) } else { (b, a) };

        Some(AgentComparison {
            leader,
            trailer,
            error_rate_delta: (stat_a.error_rate - stat_b.error_rate).abs(),
            avg_response_ms_delta: (stat_a.avg_response_ms - stat_b.avg_response_ms).abs(),
        })
    }

    fn aggregate_operational_metrics(&self) -> (f64, f64) {
        let stats = self.history.agent_stats();
        let total_requests: u64 = stats.iter().map(|s| s.requests).sum();
        if total_requests == 0 {
            return (0.0, 0.0);
        }
        let total_errors: u64 = stats.iter().map(|s| s.errors).sum();
        let error_rate = total_errors as f64 / total_requests as f64;
        let weighted_response_ms: f64 = stats.iter().map(|s| s.avg_execution_ms * s.requests as f64).sum();
        (error_rate, weighted_response_ms / total_requests as f64)
    }

    pub fn dashboard(
        &self,
        tenant_id: &str,
        monthly_limit_usd: f64,
        cache_metrics: &CacheMetrics,
        day_of_month: u32,
        days_in_month: u32,
    ) -> DashboardSnapshot {
        let current_spend_usd = self.ledger.current_spend(tenant_id);
        let spend_fraction = if monthly_limit_usd > 0.0 {
            current_spend_usd / monthly_limit_usd
        } else {
            0.0
        };
        let (error_rate, avg_response_ms) = self.aggregate_operational_metrics();

        DashboardSnapshot {
            tenant_id: tenant_id.to_string(),
            current_spend_usd,
            monthly_limit_usd,
            spend_fraction,
            cache_hit_rate: cache_metrics.hit_rate(),
            health: self.health_status(error_rate, avg_response_ms),
            projected_month_end_usd: self.project_month_end(current_spend_usd, day_of_month, days_in_month),
        }
    }

    /// Per-model cost breakdown, sorted by descending cost.
    pub fn cost_breakdown(&self, tenant_id: &str) -> Vec<(String, f64)> {
        let mut breakdown: Vec<(String, f64)> = self.ledger.breakdown(tenant_id).into_iter().collect();
        breakdown.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        breakdown
    }

    fn alerts(&self, dashboard: &DashboardSnapshot, agent_metrics: &[AgentMetrics]) -> Vec<MonitorAlert> {
        let mut alerts = Vec::new();

        if dashboard.spend_fraction >= 1.0 {
            alerts.push(MonitorAlert {
                severity: AlertSeverity::Critical,
                message: format!("{} has exceeded its monthly budget", dashboard.tenant_id),
            });
        } else if dashboard.spend_fraction >= 0.8 {
            alerts.push(MonitorAlert {
                severity: AlertSeverity::Warning,
                message: format!("{} is at {:.0}% of its monthly budget", dashboard.tenant_id, dashboard.spend_fraction * 100.0),
            });
        }

        for metrics in agent_metrics {
            let message = format!(
                "{:?}: {:.1}% error rate, {:.0}ms avg response over {} requests",
                metrics.agent_type,
                metrics.error_rate * 100.0,
                metrics.avg_response_ms,
                metrics.requests
            );
            let severity = match metrics.health {
                HealthStatus::Critical => AlertSeverity::Critical,
                HealthStatus::Degraded => AlertSeverity::Warning,
                HealthStatus::Healthy => AlertSeverity::Info,
            };
            alerts.push(MonitorAlert { severity, message });
        }

        alerts
    }

    /// Full tenant report: budget dashboard, per-agent metrics, and
    /// severity-tiered alerts in one call.
    pub fn report(
        &self,
        tenant_id: &str,
        monthly_limit_usd: f64,
        cache_metrics: &CacheMetrics,
        day_of_month: u32,
        days_in_month: u32,
    ) -> PerformanceReport {
        let dashboard = self.dashboard(tenant_id, monthly_limit_usd, cache_metrics, day_of_month, days_in_month);
        let agent_metrics = self.agent_metrics();
        let alerts = self.alerts(&dashboard, &agent_metrics);
        PerformanceReport {
            dashboard,
            agent_metrics,
            alerts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::TaskRecord;
    use chrono::Utc;

    fn record(agent_type: AgentType, success: bool, execution_ms: u64) -> TaskRecord {
        TaskRecord {
            task_id: uuid::Uuid::new_v4().to_string(),
            agent_type,
            platform: "twitter".to_string(),
            success,
            execution_ms,
            cost_usd: 0.01,
            temperature: 0.5,
            content: "post".to_string(),
            completed_at: Utc::now(),
        }
    }

    fn monitor() -> (PerformanceMonitor, Arc<TaskHistory>) {
        let history = Arc::new(TaskHistory::new());
        let monitor = PerformanceMonitor::new(Arc::new(CostLedger::new(0.8)), history.clone());
        (monitor, history)
    }

    #[test]
    fn health_status_thresholds() {
        let (monitor, _history) = monitor();
        assert_eq!(monitor.health_status(0.0, 1000.0), HealthStatus::Healthy);
        assert_eq!(monitor.health_status(0.1, 1000.0), HealthStatus::Degraded);
        assert_eq!(monitor.health_status(0.0, 6000.0), HealthStatus::Degraded);
        assert_eq!(monitor.health_status(0.3, 1000.0), HealthStatus::Critical);
        assert_eq!(monitor.health_status(0.0, 20_000.0), HealthStatus::Critical);
    }

    #[test]
    fn projection_scales_linearly() {
        let (monitor, _history) = monitor();
        let projected = monitor.project_month_end(10.0, 10, 30);
        assert!((projected - 30.0).abs() < 1e-9);
    }

    #[test]
    fn projection_handles_first_day_without_division_by_zero() {
        let (monitor, _history) = monitor();
        assert_eq!(monitor.project_month_end(5.0, 0, 30), 5.0);
    }

    #[test]
    fn dashboard_reports_degraded_from_error_rate_not_spend() {
        let (monitor, history) = monitor();
        monitor.ledger.record("tenant-a", "claude-haiku-4", 1.0, 100.0);
        for _ in 0..10 {
            history.record_task(record(AgentType::Content, true, 500));
        }
        history.record_task(record(AgentType::Content, false, 500));

        let snapshot = monitor.dashboard("tenant-a", 100.0, &CacheMetrics::default(), 15, 30);
        assert_eq!(snapshot.health, HealthStatus::Degraded);
        assert!(snapshot.spend_fraction < 0.1, "spend fraction alone should not drive health");
    }

    #[test]
    fn agent_metrics_reports_error_rate_and_response_time() {
        let (monitor, history) = monitor();
        history.record_task(record(AgentType::Content, true, 1000));
        history.record_task(record(AgentType::Content, false, 3000));

        let metrics = monitor.agent_metrics();
        let content = metrics.iter().find(|m| m.agent_type == AgentType::Content).unwrap();
        assert_eq!(content.requests, 2);
        assert!((content.error_rate - 0.5).abs() < 1e-9);
        assert!((content.avg_response_ms - 2000.0).abs() < 1e-9);
        assert_eq!(content.health, HealthStatus::Critical);
    }

    #[test]
    fn compare_agents_picks_the_lower_error_rate_as_leader() {
        let (monitor, history) = monitor();
        history.record_task(record(AgentType::Content, true, 500));
        history.record_task(record(AgentType::Analytics, false, 500));

        let comparison = monitor.compare_agents(AgentType::Content, AgentType::Analytics).unwrap();
        assert_eq!(comparison.leader, AgentType::Content);
        assert_eq!(comparison.trailer, AgentType::Analytics);
    }

    #[test]
    fn cost_breakdown_is_sorted_descending() {
        let (monitor, _history) = monitor();
        monitor.ledger.record("tenant-a", "claude-opus-4", 10.0, 1000.0);
        monitor.ledger.record("tenant-a", "claude-haiku-4", 1.0, 1000.0);
        let breakdown = monitor.cost_breakdown("tenant-a");
        assert_eq!(breakdown[0].0, "claude-opus-4");
        assert_eq!(breakdown[1].0, "claude-haiku-4");
    }

    #[test]
    fn report_includes_severity_tiered_alerts() {
        let (monitor, history) = monitor();
        monitor.ledger.record("tenant-a", "claude-haiku-4", 95.0, 100.0);
        history.record_task(record(AgentType::Content, true, 500));

        let report = monitor.report("tenant-a", 100.0, &CacheMetrics::default(), 15, 30);
        assert!(report.alerts.iter().any(|a| a.severity == AlertSeverity::Warning));
        assert!(report.alerts.iter().any(|a| a.severity == AlertSeverity::Info));
    }
}
