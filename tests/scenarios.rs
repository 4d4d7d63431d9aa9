//! End-to-end scenarios exercising the coordinator, ledger, router,
//! scheduler, and workflow orchestrator together rather than unit-by-unit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use aic_core::agents::{AgentRegistry, AgentType};
use aic_core::bus::{MessageBus, MessageKind};
use aic_core::cache::ResponseCache;
use aic_core::coordinator::{Coordinator, CoordinatorConfig};
use aic_core::error::{CoreError, UpstreamError};
use aic_core::history::TaskHistory;
use aic_core::ledger::CostLedger;
use aic_core::provider::pricing::PricingTable;
use aic_core::provider::types::{ChatMessage, CompletionRequest, CompletionResponse, Role, TokenUsage};
use aic_core::provider::{Provider, ProviderRegistry};
use aic_core::router::{ModelRouter, Priority};
use aic_core::scheduler::{evergreen_priority, JobState, Scheduler, SchedulerConfig};
use aic_core::workflow::{WorkflowOrchestrator, WorkflowStep};

struct FixedCostProvider {
    text: &'static str,
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl Provider for FixedCostProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn complete(
        &self,
        _request: &CompletionRequest,
        model: &str,
        _deadline: Duration,
    ) -> Result<CompletionResponse, UpstreamError> {
        let pricing = PricingTable::default();
        let descriptor = pricing.get(model).expect("model must be priced");
        let cost_usd = (self.prompt_tokens as f64 * descriptor.input_price_per_mtok
            + self.completion_tokens as f64 * descriptor.output_price_per_mtok)
            / 1_000_000.0;
        Ok(CompletionResponse {
            text: self.text.to_string(),
            chosen_model: model.to_string(),
            tokens: TokenUsage {
                prompt: self.prompt_tokens,
                completion: self.completion_tokens,
            },
            cost_usd,
            cached: false,
        })
    }
}

fn all_models() -> [&'static str; 5] {
    ["claude-opus-4", "gpt-4-turbo", "claude-haiku-4", "gpt-4o-mini", "ollama/llama3-70b"]
}

fn build_coordinator() -> Coordinator {
    let pricing = PricingTable::default();
    let mut providers = ProviderRegistry::new(pricing.clone());
    providers.register(
        "fixed",
        Arc::new(FixedCostProvider {
            text: "ok",
            prompt_tokens: 1000,
            completion_tokens: 500,
        }),
        &all_models(),
    );

    Coordinator::new(
        Arc::new(ModelRouter::new(pricing, 0.7)),
        Arc::new(providers),
        Arc::new(ResponseCache::new(1000, 86_400)),
        Arc::new(CostLedger::new(0.8)),
        Arc::new(AgentRegistry::default()),
        CoordinatorConfig {
            default_monthly_budget_usd: 100.0,
            provider_timeout: Duration::from_secs(30),
        },
    )
}

fn sample_request(tenant_id: &str) -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage {
            role: Role::User,
            text: "summarize last week's engagement".to_string(),
        }],
        model: Some("claude-haiku-4".to_string()),
        temperature: 0.5,
        max_output_tokens: 256,
        tenant_id: tenant_id.to_string(),
        cache_key: None,
        cache_ttl_seconds: None,
    }
}

/// Scenario 1: identical request served from cache costs nothing the
/// second time, and the first dispatch costs exactly $0.00045 (1000 prompt
/// + 500 completion tokens at $0.15/$0.60 per Mtok on claude-haiku-4).
#[tokio::test]
async fn scenario_cache_hit_matches_worked_example_cost() {
    let coordinator = build_coordinator();
    let request = sample_request("tenant-scenario-1");

    let first = coordinator.complete(request.clone(), Priority::Normal, None).await.unwrap();
    assert!(!first.response.cached);
    assert!((first.response.cost_usd - 0.00045).abs() < 1e-9);

    let second = coordinator.complete(request, Priority::Normal, None).await.unwrap();
    assert!(second.response.cached);
}

/// Scenario 2: a tenant sitting at $4.99 of a $5.00 budget is allowed one
/// more request, but is throttled once that request pushes spend over the
/// limit.
#[tokio::test]
async fn scenario_budget_throttle_at_limit() {
    let coordinator = build_coordinator();
    let ledger = CostLedger::new(0.8);
    ledger.record("tenant-scenario-2", "claude-haiku-4", 4.99, 5.0);
    assert!(!ledger.is_throttled("tenant-scenario-2", 5.0));

    // The coordinator's own ledger is separate from the one above; exercise
    // check_budget directly against the pre-seeded ledger to model "already
    // at 4.99 of 5.00".
    let outcome = coordinator
        .complete(sample_request("tenant-scenario-2"), Priority::Normal, Some(5.0))
        .await
        .unwrap();
    assert!(!outcome.response.cached);

    ledger.record("tenant-scenario-2", "claude-haiku-4", outcome.response.cost_usd, 5.0);
    assert!(ledger.is_throttled("tenant-scenario-2", 5.0));
    assert!(matches!(
        ledger.check_budget("tenant-scenario-2", 5.0),
        Err(CoreError::BudgetExceeded { .. })
    ));
}

/// Scenario 3: over many default-priority selections, the router converges
/// to roughly a 70/30 efficient/premium split.
#[tokio::test]
async fn scenario_70_30_split_converges_over_1000_picks() {
    let router = ModelRouter::new(PricingTable::default(), 0.7);
    let mut efficient = 0;
    let trials = 2000;
    for _ in 0..trials {
        let model = router.select(None, Priority::Normal).unwrap();
        if router.pricing().get(&model).unwrap().tier == aic_core::provider::types::Tier::Efficient {
            efficient += 1;
        }
    }
    let ratio = efficient as f64 / trials as f64;
    assert!((ratio - 0.7).abs() < 0.01, "ratio was {ratio}");
}

/// Scenario 4: a 3-agent collaborative workflow accumulates shared context
/// from every participant and logs one bus message per participant.
#[tokio::test]
async fn scenario_three_participant_workflow_logs_every_contribution() {
    let pricing = PricingTable::default();
    let mut providers = ProviderRegistry::new(pricing.clone());
    providers.register(
        "fixed",
        Arc::new(FixedCostProvider {
            text: "contribution",
            prompt_tokens: 200,
            completion_tokens: 100,
        }),
        &all_models(),
    );
    let coordinator = Arc::new(Coordinator::new(
        Arc::new(ModelRouter::new(pricing, 0.7)),
        Arc::new(providers),
        Arc::new(ResponseCache::new(1000, 86_400)),
        Arc::new(CostLedger::new(0.8)),
        Arc::new(AgentRegistry::default()),
        CoordinatorConfig {
            default_monthly_budget_usd: 100.0,
            provider_timeout: Duration::from_secs(30),
        },
    ));
    let bus = Arc::new(MessageBus::new());
    let orchestrator = WorkflowOrchestrator::new(coordinator, bus.clone(), Arc::new(TaskHistory::new()));

    let steps = vec![
        WorkflowStep {
            agent_type: AgentType::Analytics,
            instruction_template: "summarize the week".to_string(),
        },
        WorkflowStep {
            agent_type: AgentType::Strategy,
            instruction_template: "propose next steps".to_string(),
        },
        WorkflowStep {
            agent_type: AgentType::Content,
            instruction_template: "draft the post".to_string(),
        },
    ];

    let result = orchestrator.execute_collaborative("tenant-scenario-4", &steps).await.unwrap();
    let history = bus.history(&result.workflow_id);
    let requests = history.iter().filter(|m| m.kind == MessageKind::Request).count();
    let responses = history.iter().filter(|m| m.kind == MessageKind::Response).count();
    let feedback_requests = history.iter().filter(|m| m.kind == MessageKind::FeedbackRequest).count();
    assert!(requests >= 3, "expected at least 3 request messages, got {requests}");
    assert!(responses >= 3, "expected at least 3 response messages, got {responses}");
    assert_eq!(feedback_requests, 2);
    assert!(result.shared_context.contains("Analytics"));
    assert!(result.shared_context.contains("Strategy"));
    assert!(result.shared_context.contains("Content"));
}

/// Scenario 5: a job that crashes mid-run (its lease goes stale without a
/// completion) is reclaimed by the next sweep past the overdue window.
#[test]
fn scenario_crash_recovery_via_sweep() {
    let scheduler = Scheduler::new(SchedulerConfig {
        sweep_interval: Duration::from_secs(300),
        sweep_overdue: Duration::from_secs(60),
    });
    let now = Utc::now();
    scheduler.schedule("publish:post-99", "job-99".to_string(), now - chrono::Duration::seconds(5));

    let first_sweep = scheduler.sweep(now);
    assert_eq!(first_sweep.len(), 1);
    assert_eq!(scheduler.get("job-99").unwrap().state, JobState::Running);

    // Simulate the worker dying without calling `complete`: the lease goes
    // stale past the overdue window and a later sweep reclaims it.
    let after_crash = now + chrono::Duration::seconds(90);
    let second_sweep = scheduler.sweep(after_crash);
    assert_eq!(second_sweep.len(), 1);
    assert_eq!(second_sweep[0].id, "job-99");
}

/// Scenario 6: evergreen rotation priority ordering for five posts, none
/// ever reposted, aged 39/40/50/42/60 days since last publish, yields the
/// literal 89/90/100/92/100 priorities.
#[test]
fn scenario_evergreen_rotation_priority_ordering() {
    let post_a = evergreen_priority(39.0, 0);
    let post_b = evergreen_priority(40.0, 0);
    let post_c = evergreen_priority(50.0, 0);
    let post_d = evergreen_priority(42.0, 0);
    let post_e = evergreen_priority(60.0, 0);

    assert_eq!(post_a, 89.0);
    assert_eq!(post_b, 90.0);
    assert_eq!(post_c, 100.0);
    assert_eq!(post_d, 92.0);
    assert_eq!(post_e, 100.0);

    let mut ranked = vec![("a", post_a), ("b", post_b), ("c", post_c), ("d", post_d), ("e", post_e)];
    ranked.sort_by(|x, y| y.1.partial_cmp(&x.1).unwrap());
    assert_eq!(ranked[0].1, 100.0);
    assert_eq!(ranked.last().unwrap().0, "a");
}
