use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use agentflow_core::descriptor::{ParamSpec, TypeDescriptor};
use agentflow_core::error::Result;
use agentflow_core::traits::Action;
use agentflow_core::types::SessionId;
use agentflow_tools::required_arg;

use crate::agent::Agent;

/// Exposes an agent as an action of another agent.
///
/// Each call runs in a throwaway session unless a fixed session is set, in
/// which case the sub-agent keeps its conversation across calls.
pub struct AgentAction {
    agent: Arc<Agent>,
    name: String,
    description: String,
    session: Option<SessionId>,
    timeout_secs: u64,
}

impl AgentAction {
    pub fn new(agent: Arc<Agent>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            agent,
            name: name.into(),
            description: description.into(),
            session: None,
            timeout_secs: 300,
        }
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Deletes a per-call session when the call ends, including when the call
/// future is dropped by a timeout.
struct ThrowawaySession<'a> {
    agent: &'a Agent,
    session: SessionId,
}

impl Drop for ThrowawaySession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.agent.delete_session(&self.session) {
            warn!(session = %self.session, error = %e, "Failed to delete sub-agent session");
        }
    }
}

impl Action for AgentAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::new("query", TypeDescriptor::String)
            .with_description("Question or task for the sub-agent")]
    }

    fn result_type(&self) -> Option<TypeDescriptor> {
        Some(TypeDescriptor::record([
            ("answer", TypeDescriptor::String),
            ("converged", TypeDescriptor::Boolean),
            ("action_calls", TypeDescriptor::Integer),
        ]))
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn call(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let query: String = required_arg(&args, &self.name, "query")?;
            let session = self.session.clone().unwrap_or_else(SessionId::new);
            let _cleanup = self.session.is_none().then(|| ThrowawaySession {
                agent: &self.agent,
                session: session.clone(),
            });
            debug!(action = %self.name, session = %session, "Delegating to sub-agent");

            let run = self.agent.invoke(&query, Some(&session)).await?;
            let state = run.final_state();
            Ok(json!({
                "answer": state.final_text().unwrap_or_default(),
                "converged": state.converged(),
                "action_calls": state.action_calls,
            }))
        })
    }
}
