//! Message Bus (C7).
//!
//! Per-recipient FIFO inboxes for direct agent-to-agent messages, plus a
//! workflow-indexed history ring (capped at 1000 entries per workflow) used
//! for collaboration replay and the collaboration-efficiency calculation in
//! the workflow orchestrator.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

const WORKFLOW_HISTORY_CAPACITY: usize = 1000;

/// The role a message plays in a collaborative workflow exchange: a step
/// asking a participant to contribute, a participant's (possibly broadcast)
/// answer, or a request for feedback on a finished contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Request,
    Response,
    FeedbackRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    pub from: String,
    pub to: String,
    pub workflow_id: Option<String>,
    pub kind: MessageKind,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

pub struct MessageBus {
    inboxes: DashMap<String, VecDeque<BusMessage>>,
    workflow_history: DashMap<String, VecDeque<BusMessage>>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            inboxes: DashMap::new(),
            workflow_history: DashMap::new(),
        }
    }

    pub fn send(&self, message: BusMessage) {
        if let Some(workflow_id) = message.workflow_id.clone() {
            let mut history = self.workflow_history.entry(workflow_id).or_default();
            if history.len() == WORKFLOW_HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(message.clone());
        }
        self.inboxes
            .entry(message.to.clone())
            .or_default()
            .push_back(message);
    }

    pub fn broadcast(
        &self,
        from: &str,
        recipients: &[&str],
        workflow_id: Option<&str>,
        kind: MessageKind,
        body: &str,
        at: DateTime<Utc>,
    ) {
        for recipient in recipients {
            self.send(BusMessage {
                from: from.to_string(),
                to: recipient.to_string(),
                workflow_id: workflow_id.map(|s| s.to_string()),
                kind,
                body: body.to_string(),
                sent_at: at,
            });
        }
    }

    /// Pops the oldest undelivered message for `recipient`, if any.
    pub fn receive(&self, recipient: &str) -> Option<BusMessage> {
        self.inboxes.get_mut(recipient).and_then(|mut inbox| inbox.pop_front())
    }

    pub fn inbox_depth(&self, recipient: &str) -> usize {
        self.inboxes.get(recipient).map(|i| i.len()).unwrap_or(0)
    }

    /// Full message history for a workflow, oldest first.
    pub fn history(&self, workflow_id: &str) -> Vec<BusMessage> {
        self.workflow_history
            .get(workflow_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(from: &str, to: &str, workflow_id: Option<&str>, body: &str) -> BusMessage {
        BusMessage {
            from: from.to_string(),
            to: to.to_string(),
            workflow_id: workflow_id.map(|s| s.to_string()),
            kind: MessageKind::Request,
            body: body.to_string(),
            sent_at: Utc::now(),
        }
    }

    #[test]
    fn receive_is_fifo_per_recipient() {
        let bus = MessageBus::new();
        bus.send(msg("a", "b", None, "first"));
        bus.send(msg("a", "b", None, "second"));
        assert_eq!(bus.receive("b").unwrap().body, "first");
        assert_eq!(bus.receive("b").unwrap().body, "second");
        assert!(bus.receive("b").is_none());
    }

    #[test]
    fn broadcast_fans_out_to_every_recipient() {
        let bus = MessageBus::new();
        bus.broadcast("coordinator", &["a", "b", "c"], None, MessageKind::Request, "go", Utc::now());
        assert_eq!(bus.inbox_depth("a"), 1);
        assert_eq!(bus.inbox_depth("b"), 1);
        assert_eq!(bus.inbox_depth("c"), 1);
    }

    #[test]
    fn workflow_history_is_capped_at_1000() {
        let bus = MessageBus::new();
        for i in 0..1100 {
            bus.send(msg("a", "b", Some("wf-1"), &format!("msg-{i}")));
        }
        let history = bus.history("wf-1");
        assert_eq!(history.len(), 1000);
        assert_eq!(history.first().unwrap().body, "msg-100");
        assert_eq!(history.last().unwrap().body, "msg-1099");
    }

    #[test]
    fn messages_without_workflow_id_are_absent_from_history() {
        let bus = MessageBus::new();
        bus.send(msg("a", "b", None, "no workflow"));
        assert!(bus.history("wf-1").is_empty());
    }
}
