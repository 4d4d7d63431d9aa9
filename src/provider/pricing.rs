//! Process-wide model descriptor / pricing table (spec.md §3 "Model Descriptor").

use std::collections::HashMap;

use super::types::{ModelDescriptor, Tier};

/// Process-wide constant table of known models.
#[derive(Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelDescriptor>,
}

impl PricingTable {
    pub fn get(&self, model: &str) -> Option<&ModelDescriptor> {
        self.models.get(model)
    }

    pub fn all(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn by_tier(&self, tier: Tier) -> Vec<&ModelDescriptor> {
        let mut models: Vec<&ModelDescriptor> =
            self.models.values().filter(|m| m.tier == tier).collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models
    }

    /// `estimate(model, prompt_tok, completion_tok)` from spec.md §4.4.
    pub fn estimate(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> Option<f64> {
        self.models.get(model).map(|d| {
            (prompt_tokens as f64 * d.input_price_per_mtok
                + completion_tokens as f64 * d.output_price_per_mtok)
                / 1_000_000.0
        })
    }

    /// Minimum of `(input_price + output_price)/2` among efficient models — the
    /// "cheapest efficient model" rule used for `priority=low`.
    pub fn cheapest_efficient(&self) -> Option<&ModelDescriptor> {
        self.by_tier(Tier::Efficient)
            .into_iter()
            .min_by(|a, b| {
                let avg = |m: &&ModelDescriptor| (m.input_price_per_mtok + m.output_price_per_mtok) / 2.0;
                avg(a).partial_cmp(&avg(b)).unwrap()
            })
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        let descriptors = vec![
            ModelDescriptor {
                id: "claude-opus-4".to_string(),
                tier: Tier::Premium,
                input_price_per_mtok: 15.0,
                output_price_per_mtok: 75.0,
                max_output_tokens: 8_192,
                context_window: 200_000,
            },
            ModelDescriptor {
                id: "gpt-4-turbo".to_string(),
                tier: Tier::Premium,
                input_price_per_mtok: 10.0,
                output_price_per_mtok: 30.0,
                max_output_tokens: 4_096,
                context_window: 128_000,
            },
            ModelDescriptor {
                id: "claude-haiku-4".to_string(),
                tier: Tier::Efficient,
                input_price_per_mtok: 0.15,
                output_price_per_mtok: 0.60,
                max_output_tokens: 4_096,
                context_window: 200_000,
            },
            ModelDescriptor {
                id: "gpt-4o-mini".to_string(),
                tier: Tier::Efficient,
                input_price_per_mtok: 0.15,
                output_price_per_mtok: 0.60,
                max_output_tokens: 16_384,
                context_window: 128_000,
            },
            ModelDescriptor {
                id: "ollama/llama3-70b".to_string(),
                tier: Tier::Efficient,
                input_price_per_mtok: 0.0,
                output_price_per_mtok: 0.0,
                max_output_tokens: 4_096,
                context_window: 8_192,
            },
        ];

        let models = descriptors.into_iter().map(|d| (d.id.clone(), d)).collect();
        Self { models }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_matches_worked_example() {
        // spec.md §8 scenario 1: prompt 1000, completion 500 at $0.15/$0.60 per Mtok.
        let table = PricingTable::default();
        let cost = table.estimate("claude-haiku-4", 1000, 500).unwrap();
        assert!((cost - 0.00045).abs() < 1e-9);
    }

    #[test]
    fn cheapest_efficient_ties_broken_by_id() {
        let table = PricingTable::default();
        let cheapest = table.cheapest_efficient().unwrap();
        assert_eq!(cheapest.tier, Tier::Efficient);
        assert_eq!(cheapest.input_price_per_mtok, 0.0);
    }

    #[test]
    fn by_tier_is_sorted_and_disjoint() {
        let table = PricingTable::default();
        let efficient = table.by_tier(Tier::Efficient);
        let premium = table.by_tier(Tier::Premium);
        assert!(efficient.len() >= 2);
        assert!(premium.len() >= 2);
        assert!(efficient.iter().all(|m| m.tier == Tier::Efficient));
    }
}
