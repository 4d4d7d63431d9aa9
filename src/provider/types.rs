//! Shared request/response shapes for provider adapters (C1).

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Conversational role. `system`, if present, must be unique and first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

/// Model tier, used by the router's priority/split rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Premium,
    Efficient,
}

/// Process-wide constant describing one upstream model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub tier: Tier,
    pub input_price_per_mtok: f64,
    pub output_price_per_mtok: f64,
    pub max_output_tokens: u32,
    pub context_window: u32,
}

/// A request to a provider adapter, assembled by the coordinator or agent path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub tenant_id: String,
    pub cache_key: Option<String>,
    pub cache_ttl_seconds: Option<u64>,
}

impl CompletionRequest {
    /// Validates the system-role-unique-and-first invariant and the temperature range.
    pub fn validate(&self) -> CoreResult<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(CoreError::Validation(format!(
                "temperature {} out of range [0,2]",
                self.temperature
            )));
        }

        let system_count = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        if system_count > 1 {
            return Err(CoreError::Validation(
                "at most one system message is allowed".to_string(),
            ));
        }
        if system_count == 1 && !matches!(self.messages.first(), Some(m) if m.role == Role::System)
        {
            return Err(CoreError::Validation(
                "system message, if present, must be first".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt + self.completion
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub chosen_model: String,
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub cached: bool,
}

impl CompletionResponse {
    pub fn invariants_hold(&self) -> bool {
        self.tokens.total() == self.tokens.prompt + self.tokens.completion && self.cost_usd >= 0.0
    }
}

/// Fallback token estimator used when a vendor omits usage data, so the
/// ledger stays deterministic in failure modes (spec.md §4.1).
///
/// Prompt tokens use a coarse byte-pair approximation (4 bytes/token);
/// completion tokens are `ceil(len(output_chars) / 4)`.
pub fn estimate_tokens(prompt_chars: usize, completion_chars: usize) -> TokenUsage {
    TokenUsage {
        prompt: ((prompt_chars + 3) / 4) as u32,
        completion: ((completion_chars + 3) / 4) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, text: &str) -> ChatMessage {
        ChatMessage {
            role,
            text: text.to_string(),
        }
    }

    fn base_request(messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest {
            messages,
            model: None,
            temperature: 0.7,
            max_output_tokens: 256,
            tenant_id: "t1".to_string(),
            cache_key: None,
            cache_ttl_seconds: None,
        }
    }

    #[test]
    fn rejects_temperature_out_of_range() {
        let mut req = base_request(vec![msg(Role::User, "hi")]);
        req.temperature = 2.5;
        assert!(req.validate().is_err());
    }

    #[test]
    fn accepts_boundary_temperatures() {
        let mut req = base_request(vec![msg(Role::User, "hi")]);
        req.temperature = 0.0;
        assert!(req.validate().is_ok());
        req.temperature = 2.0;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_multiple_system_messages() {
        let req = base_request(vec![
            msg(Role::System, "s1"),
            msg(Role::System, "s2"),
            msg(Role::User, "hi"),
        ]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_system_not_first() {
        let req = base_request(vec![msg(Role::User, "hi"), msg(Role::System, "s1")]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        let usage = estimate_tokens(1, 5);
        assert_eq!(usage.prompt, 1);
        assert_eq!(usage.completion, 2);
    }
}
