//! Automation Rules (C9).
//!
//! Rules are evaluated in priority order (highest first, ties broken by
//! insertion order) against a flat fact map. Unlike a general rule engine,
//! every rule action belongs to the fixed publish-decision taxonomy the
//! automation mode gates: a rule doesn't execute arbitrary side effects, it
//! only ever votes on whether a piece of content should auto-publish,
//! require human approval, be skipped, or just raise a notification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutomationMode {
    FullAutonomous,
    Assisted,
    Manual,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FactValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: FactValue,
}

impl Condition {
    fn matches(&self, facts: &HashMap<String, FactValue>) -> bool {
        let Some(actual) = facts.get(&self.field) else {
            return false;
        };
        match (&self.operator, actual, &self.value) {
            (Operator::Equals, FactValue::Number(a), FactValue::Number(b)) => a == b,
            (Operator::Equals, FactValue::Text(a), FactValue::Text(b)) => a == b,
            (Operator::Equals, FactValue::Bool(a), FactValue::Bool(b)) => a == b,
            (Operator::Contains, FactValue::Text(a), FactValue::Text(b)) => a.contains(b.as_str()),
            (Operator::GreaterThan, FactValue::Number(a), FactValue::Number(b)) => a > b,
            (Operator::LessThan, FactValue::Number(a), FactValue::Number(b)) => a < b,
            _ => false,
        }
    }
}

/// The fixed action taxonomy a matched rule can vote for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleAction {
    AutoPublish,
    RequireApproval,
    Skip,
    Notify,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    pub name: String,
    pub priority: i32,
    pub conditions: Vec<Condition>,
    pub action: RuleAction,
}

impl AutomationRule {
    fn matches(&self, facts: &HashMap<String, FactValue>) -> bool {
        self.conditions.iter().all(|c| c.matches(facts))
    }
}

/// The publish decision `evaluate` renders for a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PublishDecision {
    pub auto_publish: bool,
    pub requires_approval: bool,
}

pub struct AutomationEngine {
    rules: Vec<AutomationRule>,
    mode: AutomationMode,
}

impl AutomationEngine {
    pub fn new(mode: AutomationMode) -> Self {
        Self { rules: Vec::new(), mode }
    }

    pub fn add_rule(&mut self, rule: AutomationRule) {
        self.rules.push(rule);
    }

    pub fn mode(&self) -> AutomationMode {
        self.mode
    }

    /// Renders the `{auto_publish, requires_approval}` decision for `facts`.
    ///
    /// - `FullAutonomous`: always auto-publishes.
    /// - `Assisted`/`Manual`: always requires approval.
    /// - `Hybrid`: defers to the highest-priority matching rule's action
    ///   (`AutoPublish`/`Notify` publish without approval, `RequireApproval`
    ///   requires it, `Skip` does neither); with no match, requires approval.
    pub fn evaluate(&self, facts: &HashMap<String, FactValue>) -> PublishDecision {
        match self.mode {
            AutomationMode::FullAutonomous => PublishDecision {
                auto_publish: true,
                requires_approval: false,
            },
            AutomationMode::Assisted | AutomationMode::Manual => PublishDecision {
                auto_publish: false,
                requires_approval: true,
            },
            AutomationMode::Hybrid => self.evaluate_hybrid(facts),
        }
    }

    fn evaluate_hybrid(&self, facts: &HashMap<String, FactValue>) -> PublishDecision {
        let mut matched: Vec<&AutomationRule> = self.rules.iter().filter(|r| r.matches(facts)).collect();
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));

        match matched.first() {
            Some(rule) => match rule.action {
                RuleAction::AutoPublish => PublishDecision {
                    auto_publish: true,
                    requires_approval: false,
                },
                RuleAction::RequireApproval => PublishDecision {
                    auto_publish: false,
                    requires_approval: true,
                },
                RuleAction::Skip => PublishDecision {
                    auto_publish: false,
                    requires_approval: false,
                },
                RuleAction::Notify => PublishDecision {
                    auto_publish: true,
                    requires_approval: false,
                },
            },
            None => PublishDecision {
                auto_publish: false,
                requires_approval: true,
            },
        }
    }

    pub fn should_auto_execute(&self) -> bool {
        matches!(self.mode, AutomationMode::FullAutonomous | AutomationMode::Hybrid)
    }
}
