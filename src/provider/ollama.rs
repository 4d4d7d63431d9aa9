//! Ollama provider adapter — local, unauthenticated, OpenAI-compatible shape.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{UpstreamError, UpstreamErrorKind};

use super::pricing::PricingTable;
use super::types::{estimate_tokens, ChatMessage, CompletionRequest, CompletionResponse, Role, TokenUsage};
use super::Provider;

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    pricing: PricingTable,
}

impl OllamaProvider {
    pub fn new(base_url: String, pricing: PricingTable) -> Self {
        Self {
            client: Client::new(),
            base_url,
            pricing,
        }
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        model: &str,
        deadline: Duration,
    ) -> Result<CompletionResponse, UpstreamError> {
        let descriptor = self.pricing.get(model).ok_or_else(|| {
            UpstreamError::new(UpstreamErrorKind::BadRequest, format!("unknown model {model}"))
        })?;

        // Ollama's model ids carry a provider prefix (e.g. "ollama/llama3-70b");
        // the wire request wants the bare name.
        let wire_model = model.strip_prefix("ollama/").unwrap_or(model);

        let temperature = request.temperature.clamp(0.0, 2.0);
        let max_tokens = request.max_output_tokens.min(descriptor.max_output_tokens);
        let messages: Vec<OllamaMessage> = request
            .messages
            .iter()
            .map(|m: &ChatMessage| OllamaMessage {
                role: Self::role_str(m.role).to_string(),
                content: m.text.clone(),
            })
            .collect();
        let prompt_chars: usize = request.messages.iter().map(|m| m.text.len()).sum();

        let api_request = OllamaRequest {
            model: wire_model.to_string(),
            messages,
            stream: false,
            options: OllamaOptions {
                temperature,
                num_predict: max_tokens,
            },
        };

        let send = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&api_request)
            .send();

        let response = tokio::time::timeout(deadline, send).await.map_err(|_| {
            UpstreamError::new(UpstreamErrorKind::Transient, "request deadline exceeded")
        })?;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                // A local daemon that isn't running reads as connection refused,
                // not a vendor outage — still modeled as Unavailable so routing
                // and retry policy treat it the same way.
                return Err(UpstreamError::new(UpstreamErrorKind::Unavailable, e.to_string()));
            }
        };

        let status = response.status();
        if status.is_client_error() {
            return Err(UpstreamError::new(UpstreamErrorKind::BadRequest, format!("ollama error {status}")));
        }
        if status.is_server_error() {
            return Err(UpstreamError::new(UpstreamErrorKind::Unavailable, format!("ollama error {status}")));
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::new(UpstreamErrorKind::Transient, e.to_string()))?;

        let text = body.message.content;
        let tokens = match (body.prompt_eval_count, body.eval_count) {
            (Some(p), Some(c)) => TokenUsage { prompt: p, completion: c },
            _ => estimate_tokens(prompt_chars, text.len()),
        };

        let cost_usd = (tokens.prompt as f64 * descriptor.input_price_per_mtok
            + tokens.completion as f64 * descriptor.output_price_per_mtok)
            / 1_000_000.0;

        Ok(CompletionResponse {
            text,
            chosen_model: model.to_string(),
            tokens,
            cost_usd,
            cached: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ollama_prefix_for_wire_model() {
        let model = "ollama/llama3-70b";
        assert_eq!(model.strip_prefix("ollama/").unwrap(), "llama3-70b");
    }

    #[test]
    fn zero_cost_model_yields_zero_cost() {
        let table = PricingTable::default();
        let descriptor = table.get("ollama/llama3-70b").unwrap();
        assert_eq!(descriptor.input_price_per_mtok, 0.0);
        assert_eq!(descriptor.output_price_per_mtok, 0.0);
    }
}
