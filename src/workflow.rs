//! Workflow Orchestrator (C10).
//!
//! Runs a fixed sequence of agents, threading a growing `shared_context`
//! string from each step into the next, and exchanging typed messages over
//! the bus under the workflow id: a `Request` kicks each step off, its
//! output is broadcast to every participant who already joined as a
//! `Response`, and every step after the first carries a `FeedbackRequest`
//! asking it to review the previous step's contribution before running.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::agents::AgentType;
use crate::automation::{AutomationEngine, FactValue, PublishDecision};
use crate::bus::{BusMessage, MessageBus, MessageKind};
use crate::coordinator::Coordinator;
use crate::error::{CoreError, CoreResult};
use crate::history::{LearningInsights, TaskHistory, TaskRecord};
use crate::router::Priority;

/// Above this per-workflow mean step duration, `execute_with_learning`
/// recommends trimming prompts.
const TIME_EFFICIENCY_TARGET_MS: u64 = 5000;
/// Above this total workflow cost, `execute_with_learning` recommends a
/// cheaper model.
const COST_OPTIMIZATION_THRESHOLD_USD: f64 = 0.05;

pub struct WorkflowStep {
    pub agent_type: AgentType,
    pub instruction_template: String,
}

pub struct WorkflowResult {
    pub workflow_id: String,
    pub shared_context: String,
    pub total_cost_usd: f64,
    pub collaboration_efficiency: f64,
}

/// A recommendation surfaced alongside a learning-enriched workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearningRecommendation {
    pub message: String,
}

pub struct LearningOutcome {
    pub result: WorkflowResult,
    pub recommendations: Vec<LearningRecommendation>,
}

pub struct WorkflowOrchestrator {
    coordinator: Arc<Coordinator>,
    bus: Arc<MessageBus>,
    history: Arc<TaskHistory>,
}

impl WorkflowOrchestrator {
    pub fn new(coordinator: Arc<Coordinator>, bus: Arc<MessageBus>, history: Arc<TaskHistory>) -> Self {
        Self {
            coordinator,
            bus,
            history,
        }
    }

    /// Runs every step against every participant (no `enabled_types` filter).
    pub async fn execute_collaborative(&self, tenant_id: &str, steps: &[WorkflowStep]) -> CoreResult<WorkflowResult> {
        self.execute_collaborative_filtered(tenant_id, steps, None).await
    }

    /// Executes `steps` in order, accumulating `shared_context` and
    /// exchanging typed bus messages, skipping any step whose agent type is
    /// absent from `enabled_types` when one is given. Rejects an empty
    /// `steps` list outright: a workflow with no participants has nothing
    /// to collaborate on.
    pub async fn execute_collaborative_filtered(
        &self,
        tenant_id: &str,
        steps: &[WorkflowStep],
        enabled_types: Option<&HashSet<AgentType>>,
    ) -> CoreResult<WorkflowResult> {
        if steps.is_empty() {
            return Err(CoreError::Validation(
                "collaborative workflow requires at least one participant".to_string(),
            ));
        }

        let workflow_id = Uuid::new_v4().to_string();
        let mut shared_context = String::new();
        let mut total_cost_usd = 0.0;
        let mut joined_participants: Vec<String> = Vec::new();
        let mut previous_participant: Option<String> = None;
        let mut execution_ms_samples: Vec<u64> = Vec::new();
        let mut executed_steps = 0usize;

        for step in steps {
            if let Some(enabled) = enabled_types {
                if !enabled.contains(&step.agent_type) {
                    continue;
                }
            }

            let participant = format!("{:?}", step.agent_type);
            let instruction = format!("{}\n\nContext so far:\n{shared_context}", step.instruction_template);

            self.bus.send(BusMessage {
                from: "coordinator".to_string(),
                to: participant.clone(),
                workflow_id: Some(workflow_id.clone()),
                kind: MessageKind::Request,
                body: instruction.clone(),
                sent_at: Utc::now(),
            });

            if let Some(previous) = &previous_participant {
                self.bus.send(BusMessage {
                    from: "coordinator".to_string(),
                    to: participant.clone(),
                    workflow_id: Some(workflow_id.clone()),
                    kind: MessageKind::FeedbackRequest,
                    body: format!("review {previous}'s contribution before continuing"),
                    sent_at: Utc::now(),
                });
            }

            let started = Instant::now();
            let outcome = self
                .coordinator
                .execute_agent_task(step.agent_type, tenant_id, &instruction, Priority::Normal, None)
                .await?;
            let execution_ms = started.elapsed().as_millis() as u64;
            execution_ms_samples.push(execution_ms);
            executed_steps += 1;

            shared_context.push_str(&format!("\n[{:?}] {}\n", step.agent_type, outcome.response.text));
            total_cost_usd += outcome.response.cost_usd;

            let already_joined: Vec<&str> = joined_participants.iter().map(|p| p.as_str()).collect();
            self.bus.broadcast(
                &participant,
                &already_joined,
                Some(&workflow_id),
                MessageKind::Response,
                &outcome.response.text,
                Utc::now(),
            );

            self.history.record_task(TaskRecord {
                task_id: Uuid::new_v4().to_string(),
                agent_type: step.agent_type,
                platform: "workflow".to_string(),
                success: true,
                execution_ms,
                cost_usd: outcome.response.cost_usd,
                temperature: 0.5,
                content: outcome.response.text.clone(),
                completed_at: Utc::now(),
            });

            previous_participant = Some(participant.clone());
            joined_participants.push(participant);
        }

        let collaboration_efficiency =
            self.collaboration_efficiency(&workflow_id, steps.len(), executed_steps, &execution_ms_samples);

        Ok(WorkflowResult {
            workflow_id,
            shared_context,
            total_cost_usd,
            collaboration_efficiency,
        })
    }

    /// Runs the collaborative workflow, then consults an automation engine
    /// with the outcome's facts to render a publish decision.
    pub async fn execute_with_automation(
        &self,
        tenant_id: &str,
        steps: &[WorkflowStep],
        automation: &AutomationEngine,
    ) -> CoreResult<(WorkflowResult, PublishDecision)> {
        let result = self.execute_collaborative(tenant_id, steps).await?;

        let mut facts = HashMap::new();
        facts.insert(
            "collaboration_efficiency".to_string(),
            FactValue::Number(result.collaboration_efficiency),
        );
        facts.insert("total_cost_usd".to_string(), FactValue::Number(result.total_cost_usd));

        let decision = automation.evaluate(&facts);
        Ok((result, decision))
    }

    /// Enriches every step's instruction with the current learning insights
    /// before dispatch, then returns the run's recommendations: a prompt
    /// optimization nudge if the run took more than 5s, a cheaper-model
    /// nudge if it cost more than $0.05, and a standing best-practice
    /// reminder.
    pub async fn execute_with_learning(&self, tenant_id: &str, steps: &[WorkflowStep]) -> CoreResult<LearningOutcome> {
        let insights = self.history.learning_insights();
        let preamble = learning_preamble(&insights);

        let enriched_steps: Vec<WorkflowStep> = steps
            .iter()
            .map(|step| WorkflowStep {
                agent_type: step.agent_type,
                instruction_template: format!("{preamble}{}", step.instruction_template),
            })
            .collect();

        let started = Instant::now();
        let result = self.execute_collaborative(tenant_id, &enriched_steps).await?;
        let execution_ms = started.elapsed().as_millis() as u64;

        let mut recommendations = Vec::new();
        if execution_ms > TIME_EFFICIENCY_TARGET_MS {
            recommendations.push(LearningRecommendation {
                message: "execution exceeded 5s; consider shortening or splitting prompts".to_string(),
            });
        }
        if result.total_cost_usd > COST_OPTIMIZATION_THRESHOLD_USD {
            recommendations.push(LearningRecommendation {
                message: "cost exceeded $0.05; consider routing to a cheaper model".to_string(),
            });
        }
        recommendations.push(match insights.best_practices.first() {
            Some(practice) => LearningRecommendation {
                message: format!("remember: {practice}"),
            },
            None => LearningRecommendation {
                message: "no best practices recorded yet; keep submitting feedback to build them up".to_string(),
            },
        });

        Ok(LearningOutcome { result, recommendations })
    }

    /// `0.5 * contribution_rate + 0.3 * comm_efficiency + 0.2 * time_efficiency`.
    ///
    /// - `contribution_rate`: fraction of the requested steps that actually
    ///   ran (steps skipped by an `enabled_types` filter count against it).
    /// - `comm_efficiency`: responses posted per coordination message sent
    ///   (`Request` + `FeedbackRequest`), capped at 1.0 — every ask got an
    ///   answer.
    /// - `time_efficiency`: how far the run's mean step duration came in
    ///   under the 5s target, capped at 1.0.
    fn collaboration_efficiency(
        &self,
        workflow_id: &str,
        total_steps: usize,
        executed_steps: usize,
        execution_ms_samples: &[u64],
    ) -> f64 {
        if total_steps == 0 {
            return 0.0;
        }
        let contribution_rate = executed_steps as f64 / total_steps as f64;

        let history = self.bus.history(workflow_id);
        let requests = history.iter().filter(|m| m.kind == MessageKind::Request).count() as f64;
        let responses = history.iter().filter(|m| m.kind == MessageKind::Response).count() as f64;
        let feedback_requests = history.iter().filter(|m| m.kind == MessageKind::FeedbackRequest).count() as f64;
        let coordination_messages = requests + feedback_requests;
        let comm_efficiency = if coordination_messages == 0.0 {
            0.0
        } else {
            (responses / coordination_messages).min(1.0)
        };

        let time_efficiency = if execution_ms_samples.is_empty() {
            0.0
        } else {
            let mean_ms = execution_ms_samples.iter().sum::<u64>() as f64 / execution_ms_samples.len() as f64;
            (TIME_EFFICIENCY_TARGET_MS as f64 / mean_ms.max(1.0)).min(1.0)
        };

        0.5 * contribution_rate + 0.3 * comm_efficiency + 0.2 * time_efficiency
    }
}

fn learning_preamble(insights: &LearningInsights) -> String {
    if insights.best_practices.is_empty() {
        return String::new();
    }
    format!("Keep in mind prior learnings: {}\n\n", insights.best_practices.join("; "))
}
