//! Model Router (C4).
//!
//! Selection order: explicit model override, then priority-driven tier
//! pinning (`high` -> premium default, `low` -> cheapest efficient model),
//! then a 70/30 premium/efficient split driven by a process-wide counter so
//! the ratio converges without per-request randomness.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{CoreError, CoreResult};
use crate::provider::pricing::PricingTable;
use crate::provider::types::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
    Low,
}

pub struct ModelRouter {
    pricing: PricingTable,
    counter: AtomicU64,
    split_ratio: f64,
}

impl ModelRouter {
    pub fn new(pricing: PricingTable, split_ratio: f64) -> Self {
        Self {
            pricing,
            counter: AtomicU64::new(0),
            split_ratio,
        }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// `select` implements spec.md §4.4's selection order. `override_model`
    /// wins unconditionally if it names a known model.
    pub fn select(&self, override_model: Option<&str>, priority: Priority) -> CoreResult<String> {
        if let Some(model) = override_model {
            return self
                .pricing
                .get(model)
                .map(|d| d.id.clone())
                .ok_or_else(|| CoreError::Validation(format!("unknown model override {model}")));
        }

        match priority {
            Priority::High => self.default_premium(),
            Priority::Low => self.cheapest_efficient(),
            Priority::Normal => Ok(self.split_pick()),
        }
    }

    fn default_premium(&self) -> CoreResult<String> {
        self.pricing
            .by_tier(Tier::Premium)
            .first()
            .map(|d| d.id.clone())
            .ok_or_else(|| CoreError::Internal("no premium model configured".to_string()))
    }

    fn cheapest_efficient(&self) -> CoreResult<String> {
        self.pricing
            .cheapest_efficient()
            .map(|d| d.id.clone())
            .ok_or_else(|| CoreError::Internal("no efficient model configured".to_string()))
    }

    /// Deterministic 70/30 split over a monotonic counter: bucket `n mod 10`
    /// falls in the efficient tier when `bucket < split_ratio * 10`.
    /// Within a tier, `n mod 2` alternates across tied models so traffic
    /// doesn't pile onto a single model when a tier has more than one.
    fn split_pick(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let bucket = n % 10;
        let efficient_buckets = (self.split_ratio * 10.0).round() as u64;
        let tier = if bucket < efficient_buckets {
            Tier::Efficient
        } else {
            Tier::Premium
        };
        let candidates = self.pricing.by_tier(tier);
        let idx = (n % 2) as usize % candidates.len().max(1);
        candidates
            .get(idx)
            .map(|d| d.id.clone())
            .unwrap_or_else(|| "claude-haiku-4".to_string())
    }

    pub fn estimate(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> Option<f64> {
        self.pricing.estimate(model, prompt_tokens, completion_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_priority() {
        let router = ModelRouter::new(PricingTable::default(), 0.7);
        let model = router.select(Some("gpt-4-turbo"), Priority::Low).unwrap();
        assert_eq!(model, "gpt-4-turbo");
    }

    #[test]
    fn unknown_override_is_rejected() {
        let router = ModelRouter::new(PricingTable::default(), 0.7);
        assert!(router.select(Some("not-a-model"), Priority::Normal).is_err());
    }

    #[test]
    fn high_priority_defaults_to_premium() {
        let router = ModelRouter::new(PricingTable::default(), 0.7);
        let model = router.select(None, Priority::High).unwrap();
        let descriptor = router.pricing().get(&model).unwrap();
        assert_eq!(descriptor.tier, Tier::Premium);
    }

    #[test]
    fn low_priority_picks_cheapest_efficient() {
        let router = ModelRouter::new(PricingTable::default(), 0.7);
        let model = router.select(None, Priority::Low).unwrap();
        assert_eq!(model, "ollama/llama3-70b");
    }

    #[test]
    fn split_converges_to_70_30_over_many_picks() {
        let router = ModelRouter::new(PricingTable::default(), 0.7);
        let mut efficient_count = 0;
        let trials = 1000;
        for _ in 0..trials {
            let model = router.select(None, Priority::Normal).unwrap();
            let tier = router.pricing().get(&model).unwrap().tier;
            if tier == Tier::Efficient {
                efficient_count += 1;
            }
        }
        let ratio = efficient_count as f64 / trials as f64;
        assert!((ratio - 0.7).abs() < 0.01);
    }
}
