use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use agentflow_core::types::{ActionRequest, Message, Role, SessionId, Usage};

use crate::graph::PhaseState;

/// State moved through the agent graph.
///
/// Carries no wall-clock data, so identical inputs produce identical states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub user_query: String,
    /// Instruction text placed first in the conversation.
    pub instructions: String,
    pub messages: Vec<Message>,
    /// Actions requested by the latest model reply and not yet dispatched.
    pub pending_actions: Vec<ActionRequest>,
    pub session_id: SessionId,
    /// Actions actually executed this run.
    pub action_calls: usize,
    /// Dispatch phases entered this run.
    pub dispatch_cycles: usize,
    /// Keys of actions executed successfully this run.
    pub seen_actions: BTreeSet<String>,
    /// Serialized results by action key.
    pub result_cache: BTreeMap<String, String>,
    /// Set once a budget refusal has been delivered.
    pub budget_exhausted: bool,
    pub last_usage: Option<Usage>,
    pub cumulative_tokens: u64,
}

impl AgentState {
    pub fn new(
        session_id: SessionId,
        user_query: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            user_query: user_query.into(),
            instructions: instructions.into(),
            messages: Vec::new(),
            pending_actions: Vec::new(),
            session_id,
            action_calls: 0,
            dispatch_cycles: 0,
            seen_actions: BTreeSet::new(),
            result_cache: BTreeMap::new(),
            budget_exhausted: false,
            last_usage: None,
            cumulative_tokens: 0,
        }
    }

    /// Seed the conversation with earlier turns of the session.
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.messages = history;
        self
    }

    /// Whether the model stopped requesting actions.
    pub fn converged(&self) -> bool {
        self.pending_actions.is_empty()
    }

    /// Text of the latest assistant message.
    pub fn final_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn action_results(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_action_result())
    }

    /// Accumulate token usage from one model reply.
    pub fn record_usage(&mut self, usage: Usage) {
        self.cumulative_tokens += usage.total();
        self.last_usage = Some(usage);
    }
}

impl PhaseState for AgentState {
    fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::types::ActionStatus;
    use serde_json::json;

    #[test]
    fn test_new_state_is_converged_and_empty() {
        let s = AgentState::new(SessionId::default(), "q", "be brief");
        assert!(s.converged());
        assert!(s.messages.is_empty());
        assert_eq!(s.final_text(), None);
    }

    #[test]
    fn test_final_text_is_latest_assistant() {
        let req = ActionRequest::new("1", "lookup", json!({}));
        let mut s = AgentState::new(SessionId::default(), "q", "");
        s.messages.push(Message::assistant("first", vec![req.clone()]));
        s.messages
            .push(Message::action_result(&req, ActionStatus::Success, "42"));
        s.messages.push(Message::assistant("second", vec![]));
        assert_eq!(s.final_text(), Some("second"));
        assert_eq!(s.action_results().count(), 1);
    }

    #[test]
    fn test_record_usage_accumulates() {
        let mut s = AgentState::new(SessionId::default(), "q", "");
        s.record_usage(Usage {
            input_tokens: 10,
            output_tokens: 5,
        });
        s.record_usage(Usage {
            input_tokens: 3,
            output_tokens: 2,
        });
        assert_eq!(s.cumulative_tokens, 20);
        assert_eq!(s.last_usage.map(|u| u.total()), Some(5));
    }

    #[test]
    fn test_state_serializes() {
        let s = AgentState::new(SessionId::from_str("s1"), "q", "");
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["session_id"], json!("s1"));
        let back: AgentState = serde_json::from_value(v).unwrap();
        assert_eq!(back, s);
    }
}
