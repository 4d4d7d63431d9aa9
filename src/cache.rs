//! Response Cache (C2).
//!
//! Canonical entries are keyed by a SHA-256 fingerprint of the request shape
//! (model, temperature rounded to 3 decimals, and messages) so that two
//! textually-identical requests hit the same entry regardless of caller.
//! Caller-supplied `cache_key`s live in a disjoint namespace so a custom key
//! can never collide with, or be invalidated by, the canonical fingerprint
//! space.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::provider::types::{ChatMessage, CompletionResponse};

const DEFAULT_TTL_SECONDS: u64 = 86_400;

#[derive(Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheMetrics {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    model: &'a str,
    temperature_milli: i64,
    messages: &'a [ChatMessage],
}

/// Content-addressable fingerprint over the canonical request shape.
/// Temperature is rounded to 3 decimals before hashing so that
/// floating-point noise at the 4th decimal doesn't fragment the cache.
pub fn canonical_fingerprint(model: &str, temperature: f32, messages: &[ChatMessage]) -> String {
    let rounded = (temperature * 1000.0).round() as i64;
    let input = FingerprintInput {
        model,
        temperature_milli: rounded,
        messages,
    };
    let encoded = serde_json::to_vec(&input).expect("fingerprint input is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    hex::encode(hasher.finalize())
}

fn namespaced(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}

/// Async response cache over moka, with a separate key namespace for
/// caller-supplied keys versus canonical fingerprints.
pub struct ResponseCache {
    store: Cache<String, CompletionResponse>,
    metrics: CacheMetrics,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(max_capacity: u64, default_ttl_seconds: u64) -> Self {
        let store = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(default_ttl_seconds))
            .build();
        Self {
            store,
            metrics: CacheMetrics::default(),
            default_ttl: Duration::from_secs(default_ttl_seconds),
        }
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up by canonical fingerprint (`model`/`temperature`/`messages`).
    pub async fn get_canonical(
        &self,
        model: &str,
        temperature: f32,
        messages: &[ChatMessage],
    ) -> Option<CompletionResponse> {
        let key = namespaced("canonical", &canonical_fingerprint(model, temperature, messages));
        self.record_lookup(self.store.get(&key).await)
    }

    pub async fn put_canonical(
        &self,
        model: &str,
        temperature: f32,
        messages: &[ChatMessage],
        response: CompletionResponse,
    ) {
        let key = namespaced("canonical", &canonical_fingerprint(model, temperature, messages));
        self.store.insert(key, response).await;
    }

    /// Look up by a caller-supplied key, disjoint from the canonical namespace.
    pub async fn get_custom(&self, cache_key: &str) -> Option<CompletionResponse> {
        let key = namespaced("custom", cache_key);
        self.record_lookup(self.store.get(&key).await)
    }

    pub async fn put_custom(&self, cache_key: &str, response: CompletionResponse, ttl: Option<Duration>) {
        let key = namespaced("custom", cache_key);
        // moka's per-entry TTL requires `insert` plus a policy set at
        // construction; a per-request TTL override narrower than the
        // cache-wide TTL is honored by expiring early via `invalidate` from
        // a spawned sleep, rather than by reconfiguring the whole cache.
        self.store.insert(key.clone(), response).await;
        if let Some(custom_ttl) = ttl {
            if custom_ttl < self.default_ttl {
                let store = self.store.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(custom_ttl).await;
                    store.invalidate(&key).await;
                });
            }
        }
    }

    fn record_lookup(&self, result: Option<CompletionResponse>) -> Option<CompletionResponse> {
        match &result {
            Some(_) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Invalidate every custom-namespace entry whose key matches a glob
    /// pattern (`*` and `?` wildcards). Canonical entries are never touched
    /// by pattern invalidation — only explicit fingerprint keys expire them.
    pub async fn invalidate_pattern(&self, pattern: &str) {
        let regex = glob_to_regex(pattern);
        let prefix = "custom:";
        for key in self.store.iter().map(|(k, _)| k) {
            if let Some(rest) = key.strip_prefix(prefix) {
                if regex.is_match(rest) {
                    self.store.invalidate(&key).await;
                    self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Translates a shell-style glob (`*`, `?`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> Regex {
    let mut escaped = String::with_capacity(pattern.len() * 2 + 2);
    escaped.push('^');
    for c in pattern.chars() {
        match c {
            '*' => escaped.push_str(".*"),
            '?' => escaped.push('.'),
            c if "\\.+()|[]{}^$".contains(c) => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped.push('$');
    Regex::new(&escaped).expect("glob_to_regex always produces a valid pattern")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::{Role, TokenUsage};

    fn sample_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.to_string(),
            chosen_model: "claude-haiku-4".to_string(),
            tokens: TokenUsage {
                prompt: 10,
                completion: 5,
            },
            cost_usd: 0.0001,
            cached: false,
        }
    }

    fn sample_messages() -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: Role::User,
            text: "hello".to_string(),
        }]
    }

    #[test]
    fn fingerprint_is_stable_across_equivalent_temperature() {
        let messages = sample_messages();
        let a = canonical_fingerprint("claude-haiku-4", 0.700_0001, &messages);
        let b = canonical_fingerprint("claude-haiku-4", 0.7, &messages);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_across_model() {
        let messages = sample_messages();
        let a = canonical_fingerprint("claude-haiku-4", 0.7, &messages);
        let b = canonical_fingerprint("gpt-4o-mini", 0.7, &messages);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn canonical_hit_then_miss_tracks_metrics() {
        let cache = ResponseCache::new(100, DEFAULT_TTL_SECONDS);
        let messages = sample_messages();
        assert!(cache.get_canonical("claude-haiku-4", 0.7, &messages).await.is_none());

        cache
            .put_canonical("claude-haiku-4", 0.7, &messages, sample_response("cached"))
            .await;
        let hit = cache.get_canonical("claude-haiku-4", 0.7, &messages).await;
        assert!(hit.is_some());
        assert_eq!(cache.metrics().hits(), 1);
        assert_eq!(cache.metrics().misses(), 1);
    }

    #[tokio::test]
    async fn custom_and_canonical_namespaces_are_disjoint() {
        let cache = ResponseCache::new(100, DEFAULT_TTL_SECONDS);
        let messages = sample_messages();
        let fingerprint = canonical_fingerprint("claude-haiku-4", 0.7, &messages);

        cache.put_custom(&fingerprint, sample_response("custom"), None).await;
        let canonical_hit = cache.get_canonical("claude-haiku-4", 0.7, &messages).await;
        assert!(canonical_hit.is_none());
    }

    #[tokio::test]
    async fn pattern_invalidation_only_touches_matching_custom_keys() {
        let cache = ResponseCache::new(100, DEFAULT_TTL_SECONDS);
        cache
            .put_custom("tenant-a:post:123", sample_response("a"), None)
            .await;
        cache
            .put_custom("tenant-b:post:456", sample_response("b"), None)
            .await;

        cache.invalidate_pattern("tenant-a:*").await;

        assert!(cache.get_custom("tenant-a:post:123").await.is_none());
        assert!(cache.get_custom("tenant-b:post:456").await.is_some());
        assert_eq!(cache.metrics().invalidations(), 1);
    }

    #[test]
    fn glob_to_regex_matches_expected_shapes() {
        let regex = glob_to_regex("tenant-a:*");
        assert!(regex.is_match("tenant-a:post:123"));
        assert!(!regex.is_match("tenant-b:post:123"));
    }
}
