//! Request Coordinator (C5).
//!
//! The single entry point every ingress path funnels through: budget gate,
//! route selection, cache lookup, upstream dispatch, cache fill, ledger
//! update, in that order. `execute_agent_task` layers agent descriptors
//! (C6) on top of the same pipeline for workflow-driven calls.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::agents::{AgentRegistry, AgentType};
use crate::cache::ResponseCache;
use crate::error::{CoreError, CoreResult};
use crate::ledger::{CostLedger, LedgerAlert};
use crate::provider::types::{ChatMessage, CompletionRequest, CompletionResponse, Role};
use crate::provider::ProviderRegistry;
use crate::router::{ModelRouter, Priority};

pub struct CoordinatorConfig {
    pub default_monthly_budget_usd: f64,
    pub provider_timeout: Duration,
}

pub struct Coordinator {
    router: Arc<ModelRouter>,
    providers: Arc<ProviderRegistry>,
    cache: Arc<ResponseCache>,
    ledger: Arc<CostLedger>,
    agents: Arc<AgentRegistry>,
    config: CoordinatorConfig,
}

pub struct CompletionOutcome {
    pub response: CompletionResponse,
    pub alert: Option<LedgerAlert>,
}

impl Coordinator {
    pub fn new(
        router: Arc<ModelRouter>,
        providers: Arc<ProviderRegistry>,
        cache: Arc<ResponseCache>,
        ledger: Arc<CostLedger>,
        agents: Arc<AgentRegistry>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            router,
            providers,
            cache,
            ledger,
            agents,
            config,
        }
    }

    /// Runs the full pipeline for a caller-assembled request.
    pub async fn complete(
        &self,
        mut request: CompletionRequest,
        priority: Priority,
        monthly_limit_usd: Option<f64>,
    ) -> CoreResult<CompletionOutcome> {
        request.validate()?;
        let monthly_limit = monthly_limit_usd.unwrap_or(self.config.default_monthly_budget_usd);
        self.ledger.check_budget(&request.tenant_id, monthly_limit)?;

        let model = self
            .router
            .select(request.model.as_deref(), priority)?;

        if let Some(cache_key) = request.cache_key.as_deref() {
            if let Some(cached) = self.cache.get_custom(cache_key).await {
                return Ok(CompletionOutcome {
                    response: CompletionResponse { cached: true, ..cached },
                    alert: None,
                });
            }
        } else if let Some(cached) = self
            .cache
            .get_canonical(&model, request.temperature, &request.messages)
            .await
        {
            return Ok(CompletionOutcome {
                response: CompletionResponse { cached: true, ..cached },
                alert: None,
            });
        }

        info!(tenant_id = %request.tenant_id, model = %model, "dispatching completion to upstream");
        let response = self.dispatch_with_retry(&request, &model).await?;

        if let Some(cache_key) = request.cache_key.as_deref() {
            let ttl = request.cache_ttl_seconds.map(Duration::from_secs);
            self.cache.put_custom(cache_key, response.clone(), ttl).await;
        } else {
            self.cache
                .put_canonical(&model, request.temperature, &request.messages, response.clone())
                .await;
        }

        let alert = self
            .ledger
            .record(&request.tenant_id, &model, response.cost_usd, monthly_limit);

        Ok(CompletionOutcome { response, alert })
    }

    /// Builds a request from an agent descriptor plus a user-supplied
    /// instruction, then runs it through the same pipeline.
    pub async fn execute_agent_task(
        &self,
        agent_type: AgentType,
        tenant_id: &str,
        instruction: &str,
        priority: Priority,
        monthly_limit_usd: Option<f64>,
    ) -> CoreResult<CompletionOutcome> {
        let descriptor = self.agents.get(agent_type);
        let request = CompletionRequest {
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    text: descriptor.system_prompt.to_string(),
                },
                ChatMessage {
                    role: Role::User,
                    text: instruction.to_string(),
                },
            ],
            model: None,
            temperature: descriptor.temperature,
            max_output_tokens: 1024,
            tenant_id: tenant_id.to_string(),
            cache_key: None,
            cache_ttl_seconds: Some(descriptor.cache_ttl.as_secs()),
        };
        self.complete(request, priority, monthly_limit_usd).await
    }

    /// Dispatches to the upstream provider, retrying once after the
    /// vendor-indicated delay if the first attempt is rate-limited with a
    /// `retry_after`. Any other failure, or a second rate-limit, surfaces
    /// immediately.
    async fn dispatch_with_retry(
        &self,
        request: &CompletionRequest,
        model: &str,
    ) -> CoreResult<CompletionResponse> {
        match self
            .providers
            .complete(request, model, self.config.provider_timeout)
            .await
        {
            Ok(response) => Ok(response),
            Err(err) => {
                let core_err = CoreError::from(err);
                if core_err.is_retryable_upstream() {
                    if let CoreError::Upstream(upstream) = &core_err {
                        if let Some(delay) = upstream.retry_after {
                            tracing::warn!(
                                tenant_id = %request.tenant_id,
                                model = %model,
                                delay_ms = delay.as_millis() as u64,
                                "rate limited upstream, retrying once after delay"
                            );
                            tokio::time::sleep(delay).await;
                            return Ok(self
                                .providers
                                .complete(request, model, self.config.provider_timeout)
                                .await?);
                        }
                    }
                }
                Err(core_err)
            }
        }
    }
}
