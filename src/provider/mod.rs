//! Provider Adapters (C1)
//!
//! Each adapter exposes a single operation — given a `CompletionRequest`,
//! return a `CompletionResponse` — translating the shared message shape
//! into the vendor's shape, clamping temperature/token limits to the
//! vendor's reported maxima, and computing `cost_usd` from the descriptor
//! table rather than any vendor-reported cost.

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod pricing;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CoreError, UpstreamError, UpstreamErrorKind};
use pricing::PricingTable;
use types::{CompletionRequest, CompletionResponse};

/// Uniform completion interface implemented by every vendor adapter.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Execute a completion request against this vendor, with the given deadline.
    async fn complete(
        &self,
        request: &CompletionRequest,
        model: &str,
        deadline: Duration,
    ) -> Result<CompletionResponse, UpstreamError>;
}

/// Registry of provider adapters keyed by the provider name each model routes to.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    /// model id -> provider name
    model_providers: HashMap<String, String>,
    pricing: PricingTable,
}

impl ProviderRegistry {
    pub fn new(pricing: PricingTable) -> Self {
        Self {
            providers: HashMap::new(),
            model_providers: HashMap::new(),
            pricing,
        }
    }

    pub fn register(&mut self, provider_name: &str, provider: Arc<dyn Provider>, models: &[&str]) {
        self.providers.insert(provider_name.to_string(), provider);
        for model in models {
            self.model_providers
                .insert(model.to_string(), provider_name.to_string());
        }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn provider_for_model(&self, model: &str) -> Result<Arc<dyn Provider>, CoreError> {
        let provider_name = self
            .model_providers
            .get(model)
            .ok_or_else(|| CoreError::NotFound(format!("no provider registered for model {model}")))?;
        self.providers
            .get(provider_name)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("provider {provider_name} not registered")))
    }

    /// Dispatches to the adapter for `model`, applying the clamp rules from
    /// spec.md §4.1 (temperature and max_output_tokens clamped to the
    /// descriptor's reported maxima before the call is made).
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        model: &str,
        deadline: Duration,
    ) -> Result<CompletionResponse, UpstreamError> {
        let provider = self.provider_for_model(model).map_err(|_| {
            UpstreamError::new(
                UpstreamErrorKind::BadRequest,
                format!("unknown model {model}"),
            )
        })?;
        provider.complete(request, model, deadline).await
    }

    /// Clamp a request's max_output_tokens to the descriptor's cap for `model`.
    pub fn clamp_max_output_tokens(&self, model: &str, requested: u32) -> u32 {
        match self.pricing.get(model) {
            Some(descriptor) => requested.min(descriptor.max_output_tokens),
            None => requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::{ChatMessage, Role, TokenUsage};

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
            model: &str,
            _deadline: Duration,
        ) -> Result<CompletionResponse, UpstreamError> {
            Ok(CompletionResponse {
                text: "ok".to_string(),
                chosen_model: model.to_string(),
                tokens: TokenUsage {
                    prompt: 10,
                    completion: 5,
                },
                cost_usd: 0.0,
                cached: false,
            })
        }
    }

    fn sample_request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage {
                role: Role::User,
                text: "hi".to_string(),
            }],
            model: Some("claude-haiku-4".to_string()),
            temperature: 0.5,
            max_output_tokens: 100,
            tenant_id: "t1".to_string(),
            cache_key: None,
            cache_ttl_seconds: None,
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_provider() {
        let mut registry = ProviderRegistry::new(PricingTable::default());
        registry.register("echo", Arc::new(EchoProvider), &["claude-haiku-4"]);

        let response = registry
            .complete(&sample_request(), "claude-haiku-4", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.chosen_model, "claude-haiku-4");
    }

    #[tokio::test]
    async fn unknown_model_surfaces_bad_request() {
        let registry = ProviderRegistry::new(PricingTable::default());
        let err = registry
            .complete(&sample_request(), "nonexistent", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, UpstreamErrorKind::BadRequest);
    }

    #[test]
    fn clamp_caps_at_descriptor_max() {
        let registry = ProviderRegistry::new(PricingTable::default());
        let clamped = registry.clamp_max_output_tokens("claude-haiku-4", 100_000);
        assert_eq!(clamped, 4_096);
    }
}
