//! Logging and metrics initialization.

use std::path::Path;

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes a `tracing` subscriber writing to stdout, honoring
/// `RUST_LOG` (falling back to `log_level` from config) and, if
/// `log_dir` is given, also writing a non-rolling file appender there.
pub fn init_logging(log_level: &str, log_dir: Option<&Path>) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, "aic-core.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

/// Process-wide Prometheus registry plus the counters the coordinator and
/// scheduler increment on the request path.
pub struct CoreMetrics {
    pub registry: Registry,
    pub completions_total: IntCounterVec,
    pub cache_hits_total: IntCounter,
    pub budget_rejections_total: IntCounterVec,
}

impl CoreMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let completions_total = IntCounterVec::new(
            Opts::new("aic_completions_total", "Total completions dispatched, by model"),
            &["model"],
        )?;
        let cache_hits_total = IntCounter::new("aic_cache_hits_total", "Total cache hits")?;
        let budget_rejections_total = IntCounterVec::new(
            Opts::new("aic_budget_rejections_total", "Total requests rejected for budget exhaustion"),
            &["tenant_id"],
        )?;

        registry.register(Box::new(completions_total.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(budget_rejections_total.clone()))?;

        Ok(Self {
            registry,
            completions_total,
            cache_hits_total,
            budget_rejections_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_registry_registers_all_collectors() {
        let metrics = CoreMetrics::new().unwrap();
        assert_eq!(metrics.registry.gather().len(), 3);
    }
}
