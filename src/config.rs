//! Process configuration
//!
//! Layered defaults -> optional TOML file -> environment, matching
//! spec.md §6 "Environment". Loaded once at startup into `CoreConfig` and
//! threaded through `CoreServices`.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Default monthly budget in USD for tenants without an explicit budget row.
    pub default_monthly_budget_usd: f64,

    /// Fraction of the monthly budget at which a `threshold_crossed` alert fires.
    pub default_alert_fraction: f64,

    /// Default cache TTL in seconds when a request does not specify one.
    pub cache_default_ttl_seconds: u64,

    /// Interval between scheduler sweeps, in seconds.
    pub sweep_interval_seconds: u64,

    /// Age (seconds) a `Running` job's lease may reach before the sweep treats it as abandoned.
    pub sweep_overdue_seconds: u64,

    /// Worker pool concurrency for the scheduler.
    pub worker_concurrency: usize,

    /// Target fraction of default-policy requests routed to the efficient tier.
    pub route_split_ratio: f64,

    /// Default per-provider-call deadline in seconds.
    pub provider_timeout_seconds: u64,

    /// SQLite database URL backing the ledger, task history, and scheduled jobs.
    pub database_url: String,

    /// Host/port for the HTTP ingress surface.
    pub host: String,
    pub port: u16,

    /// Log level passed to `tracing_subscriber`'s env-filter.
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_monthly_budget_usd: 100.0,
            default_alert_fraction: 0.8,
            cache_default_ttl_seconds: 86_400,
            sweep_interval_seconds: 300,
            sweep_overdue_seconds: 60,
            worker_concurrency: 4,
            route_split_ratio: 0.7,
            provider_timeout_seconds: 60,
            database_url: "sqlite://aic-core.db".to_string(),
            host: "127.0.0.1".to_string(),
            port: 4100,
            log_level: "info".to_string(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from an optional TOML file, then overlay environment
    /// variables prefixed `AIC_`.
    pub fn load(file_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = match file_path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text)?
            }
            _ => CoreConfig::default(),
        };

        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("AIC_DEFAULT_MONTHLY_BUDGET_USD") {
            if let Ok(parsed) = v.parse() {
                self.default_monthly_budget_usd = parsed;
            }
        }
        if let Ok(v) = std::env::var("AIC_CACHE_DEFAULT_TTL_SECONDS") {
            if let Ok(parsed) = v.parse() {
                self.cache_default_ttl_seconds = parsed;
            }
        }
        if let Ok(v) = std::env::var("AIC_SWEEP_INTERVAL_SECONDS") {
            if let Ok(parsed) = v.parse() {
                self.sweep_interval_seconds = parsed;
            }
        }
        if let Ok(v) = std::env::var("AIC_WORKER_CONCURRENCY") {
            if let Ok(parsed) = v.parse() {
                self.worker_concurrency = parsed;
            }
        }
        if let Ok(v) = std::env::var("AIC_ROUTE_SPLIT_RATIO") {
            if let Ok(parsed) = v.parse() {
                self.route_split_ratio = parsed;
            }
        }
        if let Ok(v) = std::env::var("AIC_DATABASE_URL") {
            self.database_url = v;
        }
        if let Ok(v) = std::env::var("AIC_HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("AIC_PORT") {
            if let Ok(parsed) = v.parse() {
                self.port = parsed;
            }
        }
        if let Ok(v) = std::env::var("AIC_LOG_LEVEL") {
            self.log_level = v;
        }
    }
}

/// Resolve a provider API key from the environment, mirroring the gateway's
/// `env:`/`$`-prefixed reference convention.
pub fn resolve_api_key(api_key_ref: &str) -> anyhow::Result<String> {
    if api_key_ref.is_empty() {
        return Ok(String::new());
    }
    let var_name = if let Some(stripped) = api_key_ref.strip_prefix("env:") {
        stripped
    } else if let Some(stripped) = api_key_ref.strip_prefix('$') {
        stripped
    } else {
        api_key_ref
    };
    std::env::var(var_name)
        .map_err(|_| anyhow::anyhow!("environment variable {} not found", var_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.default_monthly_budget_usd, 100.0);
        assert_eq!(cfg.default_alert_fraction, 0.8);
        assert_eq!(cfg.cache_default_ttl_seconds, 86_400);
        assert_eq!(cfg.sweep_interval_seconds, 300);
        assert_eq!(cfg.route_split_ratio, 0.7);
    }

    #[test]
    fn env_override_applies() {
        std::env::set_var("AIC_ROUTE_SPLIT_RATIO", "0.5");
        let mut cfg = CoreConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.route_split_ratio, 0.5);
        std::env::remove_var("AIC_ROUTE_SPLIT_RATIO");
    }

    #[test]
    fn resolve_api_key_env_prefix() {
        std::env::set_var("TEST_AIC_KEY", "secret");
        assert_eq!(resolve_api_key("env:TEST_AIC_KEY").unwrap(), "secret");
        std::env::remove_var("TEST_AIC_KEY");
    }
}
