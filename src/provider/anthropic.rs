//! Anthropic provider adapter.
//!
//! Anthropic takes the system prompt as a separate top-level field rather
//! than inline in `messages`, so this adapter is the one place the shared
//! message shape is split apart.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{UpstreamError, UpstreamErrorKind};

use super::pricing::PricingTable;
use super::types::{estimate_tokens, ChatMessage, CompletionRequest, CompletionResponse, Role, TokenUsage};
use super::Provider;

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    pricing: PricingTable,
}

impl AnthropicProvider {
    pub fn new(api_key: String, pricing: PricingTable) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
            pricing,
        }
    }

    fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system = None;
        let mut rest = Vec::with_capacity(messages.len());
        for m in messages {
            match m.role {
                Role::System => system = Some(m.text.clone()),
                Role::User => rest.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: m.text.clone(),
                }),
                Role::Assistant => rest.push(AnthropicMessage {
                    role: "assistant".to_string(),
                    content: m.text.clone(),
                }),
            }
        }
        (system, rest)
    }
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    text: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
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

        let temperature = request.temperature.clamp(0.0, 1.0);
        let max_tokens = request.max_output_tokens.min(descriptor.max_output_tokens);
        let (system, messages) = Self::split_system(&request.messages);
        let prompt_chars: usize = messages.iter().map(|m| m.content.len()).sum::<usize>()
            + system.as_ref().map(|s| s.len()).unwrap_or(0);

        let api_request = AnthropicRequest {
            model: model.to_string(),
            system,
            messages,
            max_tokens,
            temperature,
        };

        let send = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&api_request)
            .send();

        let response = tokio::time::timeout(deadline, send)
            .await
            .map_err(|_| UpstreamError::new(UpstreamErrorKind::Transient, "request deadline exceeded"))?
            .map_err(|e| UpstreamError::new(UpstreamErrorKind::Unavailable, e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(UpstreamError::new(UpstreamErrorKind::Auth, "invalid anthropic api key"));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let mut err = UpstreamError::new(UpstreamErrorKind::RateLimited, "anthropic rate limited");
            if let Some(ra) = retry_after {
                err = err.with_retry_after(ra);
            }
            return Err(err);
        }
        if status.is_client_error() {
            return Err(UpstreamError::new(UpstreamErrorKind::BadRequest, format!("anthropic error {status}")));
        }
        if status.is_server_error() {
            return Err(UpstreamError::new(UpstreamErrorKind::Unavailable, format!("anthropic error {status}")));
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::new(UpstreamErrorKind::Transient, e.to_string()))?;

        let text = body
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        let tokens = match body.usage {
            Some(AnthropicUsage {
                input_tokens: Some(p),
                output_tokens: Some(c),
            }) => TokenUsage { prompt: p, completion: c },
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
    fn split_system_pulls_out_single_system_message() {
        let messages = vec![
            ChatMessage {
                role: Role::System,
                text: "be terse".to_string(),
            },
            ChatMessage {
                role: Role::User,
                text: "hi".to_string(),
            },
        ];
        let (system, rest) = AnthropicProvider::split_system(&messages);
        assert_eq!(system.as_deref(), Some("be terse"));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].role, "user");
    }
}
