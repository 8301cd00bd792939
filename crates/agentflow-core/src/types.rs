use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the session that always exists in every session memory.
pub const DEFAULT_SESSION: &str = "default";

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// A fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    /// The always-present `default` session.
    pub fn default_session() -> Self {
        Self(DEFAULT_SESSION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Defaults to the shared `default` session, not a random id.
impl Default for SessionId {
    fn default() -> Self {
        Self::default_session()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Instruction,
    User,
    Assistant,
    ActionResult,
}

/// A model-issued request to invoke a registered action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ActionRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome attached to an action-result message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// The callable ran and returned a value (possibly replayed from cache).
    Success,
    /// The per-run action budget was exhausted; the callable was not invoked.
    BudgetExhausted,
    /// Identical call already executed in this run and caching is off.
    DuplicateCall,
    /// The callable raised, timed out, or the request could not be executed.
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::BudgetExhausted => "budget_exhausted",
            Self::DuplicateCall => "duplicate_call",
            Self::Failed => "failed",
        }
    }

    /// Refusals are synthesized by the engine without touching the callable.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::BudgetExhausted | Self::DuplicateCall)
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Actions requested by the model (assistant messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_requests: Vec<ActionRequest>,
    /// Id of the request this message answers (action-result messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_result_for: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ActionStatus>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            action_requests: vec![],
            action_result_for: None,
            name: None,
            status: None,
        }
    }

    pub fn instruction(text: impl Into<String>) -> Self {
        Self::with_role(Role::Instruction, text.into())
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, text.into())
    }

    pub fn assistant(text: impl Into<String>, action_requests: Vec<ActionRequest>) -> Self {
        Self {
            action_requests,
            ..Self::with_role(Role::Assistant, text.into())
        }
    }

    pub fn action_result(
        request: &ActionRequest,
        status: ActionStatus,
        content: impl Into<String>,
    ) -> Self {
        Self {
            action_result_for: Some(request.id.clone()),
            name: Some(request.name.clone()),
            status: Some(status),
            ..Self::with_role(Role::ActionResult, content.into())
        }
    }

    pub fn is_instruction(&self) -> bool {
        self.role == Role::Instruction
    }

    pub fn is_action_result(&self) -> bool {
        self.role == Role::ActionResult
    }
}

/// Token usage reported by the model collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// What the model collaborator returns for one invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelReply {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub requested_actions: Vec<ActionRequest>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ModelReply {
    /// A plain text reply with no action requests.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// A reply requesting the given actions.
    pub fn actions(requests: Vec<ActionRequest>) -> Self {
        Self {
            requested_actions: requests,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Calling contract of a registered action, shown to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionContract {
    pub name: String,
    /// Description with the result schema appended.
    pub description: String,
    /// JSON Schema of the accepted arguments object.
    pub parameters: serde_json::Value,
    /// JSON Schema of the declared result.
    pub returns: serde_json::Value,
}

/// Agent event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Agent run started.
    RunStarted { session_id: SessionId },
    /// The engine entered a phase.
    PhaseEntered { phase: String },
    /// Catalog entries were dropped to fit the input budget.
    CatalogPruned {
        dropped: Vec<String>,
        estimate: usize,
        budget: usize,
    },
    /// Action dispatch started.
    ActionStart {
        name: String,
        arguments: serde_json::Value,
    },
    /// Action dispatch completed.
    ActionEnd { name: String, status: ActionStatus },
    /// Agent run completed.
    RunComplete {
        session_id: SessionId,
        steps: usize,
        converged: bool,
        cumulative_tokens: u64,
    },
    /// Agent run failed.
    RunError { session_id: SessionId, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_id_is_shared() {
        assert_eq!(SessionId::default().as_str(), DEFAULT_SESSION);
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn action_result_message_addresses_request() {
        let req = ActionRequest::new("call_1", "lookup", serde_json::json!({"x": 1}));
        let msg = Message::action_result(&req, ActionStatus::Success, "{\"value\":42}");
        assert_eq!(msg.role, Role::ActionResult);
        assert_eq!(msg.action_result_for.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("lookup"));
        assert_eq!(msg.status, Some(ActionStatus::Success));
    }

    #[test]
    fn message_serialization_skips_empty_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn refusal_statuses() {
        assert!(ActionStatus::BudgetExhausted.is_refusal());
        assert!(ActionStatus::DuplicateCall.is_refusal());
        assert!(!ActionStatus::Failed.is_refusal());
        assert_eq!(ActionStatus::DuplicateCall.to_string(), "duplicate_call");
    }
}
