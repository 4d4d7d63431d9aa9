//! HTTP ingress (spec.md §6). Authentication and transport security are out
//! of scope; tenant identity is read from the `X-Tenant-Id` header as a
//! stand-in for whatever upstream gateway terminates auth in production.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agents::AgentType;
use crate::error::CoreError;
use crate::history::{Feedback, PerfMetrics};
use crate::provider::types::CompletionRequest;
use crate::router::Priority;
use crate::workflow::WorkflowStep;
use crate::CoreServices;

pub fn router(services: Arc<CoreServices>) -> Router {
    Router::new()
        .route("/v1/complete", post(complete))
        .route("/v1/agents/:agent_type/execute", post(execute_agent_task))
        .route("/v1/workflows/execute", post(execute_workflow))
        .route("/v1/tasks/feedback", post(submit_feedback))
        .route("/v1/tenants/:tenant_id/dashboard", get(tenant_dashboard))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(services)
}

fn tenant_id_from_headers(headers: &HeaderMap) -> Result<String, CoreError> {
    headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| CoreError::Validation("missing X-Tenant-Id header".to_string()))
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoreError::BudgetExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Upstream(_) => StatusCode::BAD_GATEWAY,
            CoreError::CacheUnavailable(_) | CoreError::LedgerUnavailable(_) | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct CompleteBody {
    request: CompletionRequest,
    #[serde(default)]
    priority: PriorityBody,
    monthly_limit_usd: Option<f64>,
}

#[derive(Deserialize, Default)]
enum PriorityBody {
    High,
    #[default]
    Normal,
    Low,
}

impl From<PriorityBody> for Priority {
    fn from(value: PriorityBody) -> Self {
        match value {
            PriorityBody::High => Priority::High,
            PriorityBody::Normal => Priority::Normal,
            PriorityBody::Low => Priority::Low,
        }
    }
}

async fn complete(
    State(services): State<Arc<CoreServices>>,
    Json(body): Json<CompleteBody>,
) -> Result<impl IntoResponse, CoreError> {
    let outcome = services
        .coordinator
        .complete(body.request, body.priority.into(), body.monthly_limit_usd)
        .await?;
    Ok(Json(outcome.response))
}

#[derive(Deserialize)]
struct AgentTaskBody {
    instruction: String,
    #[serde(default)]
    priority: PriorityBody,
    monthly_limit_usd: Option<f64>,
}

async fn execute_agent_task(
    State(services): State<Arc<CoreServices>>,
    Path(agent_type): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AgentTaskBody>,
) -> Result<impl IntoResponse, CoreError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let agent_type = parse_agent_type(&agent_type)?;
    let outcome = services
        .coordinator
        .execute_agent_task(agent_type, &tenant_id, &body.instruction, body.priority.into(), body.monthly_limit_usd)
        .await?;
    Ok(Json(outcome.response))
}

fn parse_agent_type(raw: &str) -> Result<AgentType, CoreError> {
    match raw {
        "analytics" => Ok(AgentType::Analytics),
        "crisis-response" => Ok(AgentType::CrisisResponse),
        "sentiment-analysis" => Ok(AgentType::SentimentAnalysis),
        "strategy" => Ok(AgentType::Strategy),
        "competitor-analysis" => Ok(AgentType::CompetitorAnalysis),
        "engagement" => Ok(AgentType::Engagement),
        "trend" => Ok(AgentType::Trend),
        "content" => Ok(AgentType::Content),
        other => Err(CoreError::Validation(format!("unknown agent type {other}"))),
    }
}

#[derive(Deserialize)]
struct WorkflowStepBody {
    agent_type: String,
    instruction_template: String,
}

#[derive(Deserialize)]
struct WorkflowBody {
    steps: Vec<WorkflowStepBody>,
}

#[derive(Serialize)]
struct WorkflowResponseBody {
    workflow_id: String,
    shared_context: String,
    total_cost_usd: f64,
    collaboration_efficiency: f64,
}

async fn execute_workflow(
    State(services): State<Arc<CoreServices>>,
    headers: HeaderMap,
    Json(body): Json<WorkflowBody>,
) -> Result<impl IntoResponse, CoreError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let mut steps = Vec::with_capacity(body.steps.len());
    for step in body.steps {
        steps.push(WorkflowStep {
            agent_type: parse_agent_type(&step.agent_type)?,
            instruction_template: step.instruction_template,
        });
    }

    let result = services
        .workflow
        .execute_collaborative(&tenant_id, &steps)
        .await?;

    Ok(Json(WorkflowResponseBody {
        workflow_id: result.workflow_id,
        shared_context: result.shared_context,
        total_cost_usd: result.total_cost_usd,
        collaboration_efficiency: result.collaboration_efficiency,
    }))
}

#[derive(Deserialize)]
struct FeedbackBody {
    task_id: String,
    rating: u8,
    #[serde(default)]
    useful: bool,
    engagement_score: Option<f64>,
    comment: Option<String>,
}

#[derive(Serialize)]
struct FeedbackResponseBody {
    accepted: bool,
}

async fn submit_feedback(
    State(services): State<Arc<CoreServices>>,
    Json(body): Json<FeedbackBody>,
) -> Result<impl IntoResponse, CoreError> {
    let accepted = services.history.add_feedback(Feedback {
        task_id: body.task_id,
        rating: body.rating,
        useful: body.useful,
        perf_metrics: body.engagement_score.map(|engagement_score| PerfMetrics { engagement_score }),
        comment: body.comment,
        submitted_at: chrono::Utc::now(),
    })?;
    Ok(Json(FeedbackResponseBody { accepted }))
}

async fn tenant_dashboard(
    State(services): State<Arc<CoreServices>>,
    Path(tenant_id): Path<String>,
) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let day_of_month = chrono::Datelike::day(&now);
    let snapshot = services.monitor.dashboard(
        &tenant_id,
        services.config.default_monthly_budget_usd,
        services.cache.metrics(),
        day_of_month,
        30,
    );
    Json(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_agent_type_rejects_unknown() {
        assert!(parse_agent_type("not-a-type").is_err());
    }

    #[test]
    fn parse_agent_type_accepts_known_kebab_case() {
        assert!(matches!(parse_agent_type("crisis-response"), Ok(AgentType::CrisisResponse)));
    }
}
