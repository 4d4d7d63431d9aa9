//! OpenAI-compatible provider adapter.
//!
//! Unlike Anthropic, OpenAI's chat-completions shape inlines the system
//! prompt as an ordinary message with role "system" — no separate field.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{UpstreamError, UpstreamErrorKind};

use super::pricing::PricingTable;
use super::types::{estimate_tokens, ChatMessage, CompletionRequest, CompletionResponse, Role, TokenUsage};
use super::Provider;

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    pricing: PricingTable,
}

impl OpenAiProvider {
    pub fn new(api_key: String, pricing: PricingTable) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
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
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[async_trait::async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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

        let temperature = request.temperature.clamp(0.0, 2.0);
        let max_tokens = request.max_output_tokens.min(descriptor.max_output_tokens);
        let messages: Vec<OpenAiMessage> = request
            .messages
            .iter()
            .map(|m: &ChatMessage| OpenAiMessage {
                role: Self::role_str(m.role).to_string(),
                content: m.text.clone(),
            })
            .collect();
        let prompt_chars: usize = request.messages.iter().map(|m| m.text.len()).sum();

        let api_request = OpenAiRequest {
            model: model.to_string(),
            messages,
            max_tokens,
            temperature,
        };

        let send = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send();

        let response = tokio::time::timeout(deadline, send)
            .await
            .map_err(|_| UpstreamError::new(UpstreamErrorKind::Transient, "request deadline exceeded"))?
            .map_err(|e| UpstreamError::new(UpstreamErrorKind::Unavailable, e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(UpstreamError::new(UpstreamErrorKind::Auth, "invalid openai api key"));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let mut err = UpstreamError::new(UpstreamErrorKind::RateLimited, "openai rate limited");
            if let Some(ra) = retry_after {
                err = err.with_retry_after(ra);
            }
            return Err(err);
        }
        if status.is_client_error() {
            return Err(UpstreamError::new(UpstreamErrorKind::BadRequest, format!("openai error {status}")));
        }
        if status.is_server_error() {
            return Err(UpstreamError::new(UpstreamErrorKind::Unavailable, format!("openai error {status}")));
        }

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::new(UpstreamErrorKind::Transient, e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        let tokens = match body.usage {
            Some(OpenAiUsage {
                prompt_tokens: Some(p),
                completion_tokens: Some(c),
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
    fn role_str_inlines_system() {
        assert_eq!(OpenAiProvider::role_str(Role::System), "system");
    }
}
