//! AI Request Coordination Core.
//!
//! Routes, budgets, caches, and ledgers LLM completions across a
//! multi-tenant agent platform, and orchestrates multi-agent workflows on
//! top of that request path.

pub mod agents;
pub mod automation;
pub mod bus;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod ledger;
pub mod monitor;
pub mod persistence;
pub mod provider;
pub mod router;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub mod workflow;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use agents::AgentRegistry;
use automation::AutomationMode;
use bus::MessageBus;
use cache::ResponseCache;
use config::CoreConfig;
use coordinator::{Coordinator, CoordinatorConfig};
use history::TaskHistory;
use ledger::CostLedger;
use monitor::PerformanceMonitor;
use persistence::PersistenceLayer;
use provider::anthropic::AnthropicProvider;
use provider::ollama::OllamaProvider;
use provider::openai::OpenAiProvider;
use provider::pricing::PricingTable;
use provider::ProviderRegistry;
use router::ModelRouter;
use scheduler::{Scheduler, SchedulerConfig};
use workflow::WorkflowOrchestrator;

/// Single dependency-injection point: every ingress surface (HTTP, the
/// scheduler's sweep loop, background workers) is handed an `Arc<CoreServices>`
/// rather than constructing its own copies of the request-path services.
pub struct CoreServices {
    pub config: CoreConfig,
    pub router: Arc<ModelRouter>,
    pub providers: Arc<ProviderRegistry>,
    pub cache: Arc<ResponseCache>,
    pub ledger: Arc<CostLedger>,
    pub agents: Arc<AgentRegistry>,
    pub bus: Arc<MessageBus>,
    pub history: Arc<TaskHistory>,
    pub coordinator: Arc<Coordinator>,
    pub workflow: Arc<WorkflowOrchestrator>,
    pub scheduler: Arc<Scheduler>,
    pub monitor: Arc<PerformanceMonitor>,
    pub persistence: Arc<PersistenceLayer>,
}

impl CoreServices {
    /// Builds the full service graph from config, registering whichever
    /// vendor adapters have an API key configured (Ollama needs none), and
    /// connecting the SQLite store that backs the ledger, task history, and
    /// scheduler.
    pub async fn build(config: CoreConfig) -> Result<Self> {
        let pricing = PricingTable::default();
        let mut provider_registry = ProviderRegistry::new(pricing.clone());

        if let Ok(anthropic_key) = config::resolve_api_key("env:ANTHROPIC_API_KEY") {
            provider_registry.register(
                "anthropic",
                Arc::new(AnthropicProvider::new(anthropic_key, pricing.clone())),
                &["claude-opus-4", "claude-haiku-4"],
            );
        }
        if let Ok(openai_key) = config::resolve_api_key("env:OPENAI_API_KEY") {
            provider_registry.register(
                "openai",
                Arc::new(OpenAiProvider::new(openai_key, pricing.clone())),
                &["gpt-4-turbo", "gpt-4o-mini"],
            );
        }
        provider_registry.register(
            "ollama",
            Arc::new(OllamaProvider::new("http://localhost:11434".to_string(), pricing.clone())),
            &["ollama/llama3-70b"],
        );

        let persistence = Arc::new(PersistenceLayer::connect(&config.database_url).await?);

        let router = Arc::new(ModelRouter::new(pricing, config.route_split_ratio));
        let providers = Arc::new(provider_registry);
        let cache = Arc::new(ResponseCache::new(100_000, config.cache_default_ttl_seconds));
        let ledger = Arc::new(CostLedger::new(config.default_alert_fraction).with_persistence(persistence.clone()));
        let agents = Arc::new(AgentRegistry::default());
        let bus = Arc::new(MessageBus::new());
        let history = Arc::new(TaskHistory::new().with_persistence(persistence.clone()));

        let coordinator = Arc::new(Coordinator::new(
            router.clone(),
            providers.clone(),
            cache.clone(),
            ledger.clone(),
            agents.clone(),
            CoordinatorConfig {
                default_monthly_budget_usd: config.default_monthly_budget_usd,
                provider_timeout: Duration::from_secs(config.provider_timeout_seconds),
            },
        ));

        let workflow = Arc::new(WorkflowOrchestrator::new(coordinator.clone(), bus.clone(), history.clone()));

        let scheduler = Arc::new(
            Scheduler::new(SchedulerConfig {
                sweep_interval: Duration::from_secs(config.sweep_interval_seconds),
                sweep_overdue: Duration::from_secs(config.sweep_overdue_seconds),
            })
            .with_persistence(persistence.clone()),
        );

        let monitor = Arc::new(PerformanceMonitor::new(ledger.clone(), history.clone()));

        Ok(Self {
            config,
            router,
            providers,
            cache,
            ledger,
            agents,
            bus,
            history,
            coordinator,
            workflow,
            scheduler,
            persistence,
            monitor,
        })
    }
}

/// Automation mode is process-wide config rather than per-tenant, matching
/// spec.md §4.9; tenants opt out by routing through manual review upstream.
pub fn default_automation_mode() -> AutomationMode {
    AutomationMode::Assisted
}
