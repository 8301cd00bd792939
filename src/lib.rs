//! agentflow: a graph-driven agent execution engine.
//!
//! An [`Agent`] walks a fixed graph (prepare, invoke, dispatch) over an
//! [`AgentState`], calling a [`ModelClient`] and the actions in an
//! [`ActionRegistry`] until the model stops requesting actions or a budget
//! ceiling is reached. Every run is recorded per session.

pub mod telemetry;

pub use agentflow_agent as agent;
pub use agentflow_core as core;
pub use agentflow_llm as llm;
pub use agentflow_tools as tools;

pub use agentflow_agent::{Agent, AgentAction, AgentState, Run, SessionMemory, StateMachine};
pub use agentflow_core::config::{AgentConfig, AppConfig, IterationPolicy, LogConfig, ModelConfig};
pub use agentflow_core::error::{AgentflowError, Result};
pub use agentflow_core::traits::{Action, ModelClient};
pub use agentflow_core::types::{
    ActionRequest, ActionStatus, AgentEvent, Message, ModelReply, Role, SessionId,
};
pub use agentflow_llm::RetryingClient;
pub use agentflow_tools::{ActionRegistry, FnAction};
