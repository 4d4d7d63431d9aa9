//! Crate-wide error taxonomy
//!
//! Every component that can fail maps its failures onto `CoreError`. Cache
//! and ledger failures are swallowed at their call sites (logged, then
//! treated as a miss/no-op) per the propagation policy; this type exists for
//! the failures that must reach a caller.

use std::time::Duration;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Kinds of failure an upstream LLM provider can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Auth,
    RateLimited,
    BadRequest,
    Transient,
    Unavailable,
}

/// A failure surfaced by a provider adapter.
#[derive(Debug, Clone, Error)]
#[error("upstream error ({kind:?}): {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Top-level error type returned across component boundaries and the HTTP
/// surface.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The tenant's monthly budget is exhausted; no upstream attempt was made.
    #[error("budget exceeded for tenant {tenant_id}: spend {current_spend_usd:.4} >= limit {monthly_limit_usd:.4}")]
    BudgetExceeded {
        tenant_id: String,
        current_spend_usd: f64,
        monthly_limit_usd: f64,
    },

    /// A provider call failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Malformed request: invalid temperature, non-future fire_at, duplicate
    /// business key, multiple system turns, etc.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced task, workflow, rule, scheduled job, or profile does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Tenant mismatch on a resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Schedule/cancel requested on a resource in a terminal state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Cache backend failed; non-fatal, coordinator proceeds treating it as a miss.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Ledger backend failed; non-fatal, coordinator proceeds without the write.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn is_retryable_upstream(&self) -> bool {
        matches!(
            self,
            CoreError::Upstream(UpstreamError {
                kind: UpstreamErrorKind::RateLimited,
                retry_after: Some(_),
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_displays_kind_and_message() {
        let err = UpstreamError::new(UpstreamErrorKind::Auth, "bad key");
        let rendered = format!("{}", err);
        assert!(rendered.contains("Auth"));
        assert!(rendered.contains("bad key"));
    }

    #[test]
    fn rate_limited_with_retry_after_is_retryable() {
        let err = CoreError::Upstream(
            UpstreamError::new(UpstreamErrorKind::RateLimited, "slow down")
                .with_retry_after(Duration::from_secs(2)),
        );
        assert!(err.is_retryable_upstream());
    }

    #[test]
    fn transient_upstream_is_not_retryable() {
        let err = CoreError::Upstream(UpstreamError::new(UpstreamErrorKind::Transient, "timeout"));
        assert!(!err.is_retryable_upstream());
    }
}
