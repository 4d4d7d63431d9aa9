//! Agent Registry (C6).
//!
//! One descriptor per agent type: system prompt template, sampling
//! temperature, cache TTL, and preferred tier. Values are fixed by
//! spec.md §4.6 rather than configured, since every tenant's agents behave
//! identically.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::types::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentType {
    Analytics,
    CrisisResponse,
    SentimentAnalysis,
    Strategy,
    CompetitorAnalysis,
    Engagement,
    Trend,
    Content,
}

#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub agent_type: AgentType,
    pub system_prompt: &'static str,
    pub temperature: f32,
    pub cache_ttl: Duration,
    pub preferred_tier: Tier,
}

pub struct AgentRegistry {
    descriptors: HashMap<AgentType, AgentDescriptor>,
}

impl AgentRegistry {
    pub fn get(&self, agent_type: AgentType) -> &AgentDescriptor {
        self.descriptors
            .get(&agent_type)
            .expect("every AgentType has a descriptor in the default registry")
    }

    pub fn all(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.descriptors.values()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        use AgentType::*;

        let hour = Duration::from_secs(3600);
        let descriptors = vec![
            AgentDescriptor {
                agent_type: Analytics,
                system_prompt: "You are an analytics agent. Summarize performance data precisely.",
                temperature: 0.2,
                cache_ttl: 24 * hour,
                preferred_tier: Tier::Efficient,
            },
            AgentDescriptor {
                agent_type: CrisisResponse,
                system_prompt: "You are a crisis response agent. Prioritize accuracy and caution.",
                temperature: 0.2,
                cache_ttl: 30 * 60 * Duration::from_secs(1),
                preferred_tier: Tier::Premium,
            },
            AgentDescriptor {
                agent_type: SentimentAnalysis,
                system_prompt: "You are a sentiment analysis agent. Classify tone objectively.",
                temperature: 0.2,
                cache_ttl: 24 * hour,
                preferred_tier: Tier::Efficient,
            },
            AgentDescriptor {
                agent_type: Strategy,
                system_prompt: "You are a strategy agent. Reason about long-term tradeoffs.",
                temperature: 0.2,
                cache_ttl: 7 * 24 * hour,
                preferred_tier: Tier::Premium,
            },
            AgentDescriptor {
                agent_type: CompetitorAnalysis,
                system_prompt: "You are a competitor analysis agent. Stay factual and comparative.",
                temperature: 0.2,
                cache_ttl: 24 * hour,
                preferred_tier: Tier::Efficient,
            },
            AgentDescriptor {
                agent_type: Engagement,
                system_prompt: "You are an engagement agent. Suggest ways to drive interaction.",
                temperature: 0.5,
                cache_ttl: hour,
                preferred_tier: Tier::Efficient,
            },
            AgentDescriptor {
                agent_type: Trend,
                system_prompt: "You are a trend-spotting agent. Identify emerging patterns.",
                temperature: 0.7,
                cache_ttl: hour,
                preferred_tier: Tier::Efficient,
            },
            AgentDescriptor {
                agent_type: Content,
                system_prompt: "You are a content generation agent. Write engaging copy.",
                temperature: 0.8,
                cache_ttl: 24 * hour,
                preferred_tier: Tier::Premium,
            },
        ];

        let descriptors = descriptors.into_iter().map(|d| (d.agent_type, d)).collect();
        Self { descriptors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crisis_response_uses_30_minute_ttl() {
        let registry = AgentRegistry::default();
        let descriptor = registry.get(AgentType::CrisisResponse);
        assert_eq!(descriptor.cache_ttl, Duration::from_secs(1800));
        assert_eq!(descriptor.temperature, 0.2);
    }

    #[test]
    fn strategy_uses_7_day_ttl_and_premium_tier() {
        let registry = AgentRegistry::default();
        let descriptor = registry.get(AgentType::Strategy);
        assert_eq!(descriptor.cache_ttl, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(descriptor.preferred_tier, Tier::Premium);
    }

    #[test]
    fn content_uses_highest_temperature() {
        let registry = AgentRegistry::default();
        let descriptor = registry.get(AgentType::Content);
        assert_eq!(descriptor.temperature, 0.8);
    }

    #[test]
    fn every_agent_type_is_registered() {
        let registry = AgentRegistry::default();
        assert_eq!(registry.all().count(), 8);
    }
}
