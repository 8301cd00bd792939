use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use tracing::{error, info, warn};

use agentflow_core::config::{AgentConfig, AppConfig, ModelConfig};
use agentflow_core::error::{AgentflowError, Result};
use agentflow_core::event::EventBus;
use agentflow_core::traits::ModelClient;
use agentflow_core::types::{AgentEvent, Message, SessionId};
use agentflow_llm::RetryingClient;
use agentflow_tools::ActionRegistry;

use crate::context::build_instructions;
use crate::dispatch::{DispatchPhase, DISPATCH};
use crate::graph::{EntryPoint, Phase, Run, StateMachine, Termination, ENTRY, TERMINATION};
use crate::invoke::{route_after_invoke, InvokePhase, INVOKE};
use crate::memory::SessionMemory;
use crate::state::AgentState;

/// Phase id of the conversation preparation phase.
pub const PREPARE: &str = "prepare";

/// Builds the conversation for a run: instruction message first, then the
/// session history, then the user query.
pub struct PreparePhase;

impl Phase<AgentState> for PreparePhase {
    fn id(&self) -> &str {
        PREPARE
    }

    fn apply(&self, mut state: AgentState) -> BoxFuture<'_, Result<AgentState>> {
        Box::pin(async move {
            let history = std::mem::take(&mut state.messages);
            let mut messages = Vec::with_capacity(history.len() + 2);
            messages.push(Message::instruction(state.instructions.clone()));
            messages.extend(history.into_iter().filter(|m| !m.is_instruction()));
            messages.push(Message::user(state.user_query.clone()));
            state.messages = messages;
            Ok(state)
        })
    }
}

/// An agent: a model, a set of actions, and the graph that drives them.
///
/// Runs are recorded per session; each new run in a session starts from the
/// conversation the previous run ended with.
pub struct Agent {
    config: AgentConfig,
    instructions: String,
    registry: Arc<ActionRegistry>,
    machine: StateMachine<AgentState>,
    memory: Mutex<SessionMemory<AgentState>>,
    event_bus: Arc<EventBus>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        model: ModelConfig,
        llm: Arc<dyn ModelClient>,
        registry: ActionRegistry,
    ) -> Result<Self> {
        if config.max_dispatch_cycles == 0 {
            return Err(AgentflowError::Config(
                "agent.max_dispatch_cycles must be at least 1".to_string(),
            ));
        }

        let registry = Arc::new(registry);
        let event_bus = Arc::new(EventBus::default());
        let instructions = build_instructions(&config, &registry);
        let max_cycles = config.max_dispatch_cycles;

        let machine = StateMachine::builder()
            .phase(EntryPoint)
            .phase(PreparePhase)
            .phase(InvokePhase::new(
                llm,
                Arc::clone(&registry),
                Arc::clone(&event_bus),
                &config,
                &model,
            ))
            .phase(DispatchPhase::new(
                Arc::clone(&registry),
                &config,
                Arc::clone(&event_bus),
            ))
            .phase(Termination::new())
            .edge(ENTRY, PREPARE)
            .edge(PREPARE, INVOKE)
            .select(INVOKE, [DISPATCH, TERMINATION], move |s: &AgentState| {
                route_after_invoke(s, max_cycles)
            })
            .edge(DISPATCH, INVOKE)
            .events(Arc::clone(&event_bus))
            .build()?;

        info!(
            actions = registry.len(),
            model = %model.model_id,
            "Agent ready"
        );

        Ok(Self {
            config,
            instructions,
            registry,
            machine,
            memory: Mutex::new(SessionMemory::new()),
            event_bus,
        })
    }

    /// Build an agent from application config. A `[model.retry]` section
    /// wraps the client in retry with backoff.
    pub fn from_config(
        config: &AppConfig,
        llm: Arc<dyn ModelClient>,
        registry: ActionRegistry,
    ) -> Result<Self> {
        let llm: Arc<dyn ModelClient> = match &config.model.retry {
            Some(retry) => Arc::new(RetryingClient::new(llm, retry.clone())),
            None => llm,
        };
        Self::new(config.agent.clone(), config.model.clone(), llm, registry)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The instruction text placed first in every conversation.
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn state_machine(&self) -> &StateMachine<AgentState> {
        &self.machine
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AgentEvent> {
        self.event_bus.subscribe()
    }

    fn memory(&self) -> MutexGuard<'_, SessionMemory<AgentState>> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer `query` within a session (the default session when `None`).
    ///
    /// The session is created on first use. The completed run is recorded
    /// in the session and returned.
    pub async fn invoke(&self, query: &str, session_id: Option<&SessionId>) -> Result<Run<AgentState>> {
        let session_id = session_id.cloned().unwrap_or_default();
        let history = {
            let mut memory = self.memory();
            memory.create_session(&session_id);
            memory
                .last_run(&session_id)
                .map(|run| run.final_state().messages.clone())
                .unwrap_or_default()
        };

        info!(session = %session_id, history = history.len(), "Agent run started");
        self.event_bus.publish(AgentEvent::RunStarted {
            session_id: session_id.clone(),
        });

        let initial = AgentState::new(session_id.clone(), query, self.instructions.clone())
            .with_history(history);

        let run = match self.machine.run(initial).await {
            Ok(run) => run,
            Err(e) => {
                error!(session = %session_id, error = %e, "Agent run failed");
                self.event_bus.publish(AgentEvent::RunError {
                    session_id: session_id.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let state = run.final_state();
        if !state.converged() {
            warn!(
                session = %session_id,
                pending = state.pending_actions.len(),
                cycles = state.dispatch_cycles,
                "Run stopped with actions still pending"
            );
        }
        info!(
            session = %session_id,
            steps = run.len(),
            action_calls = state.action_calls,
            tokens = state.cumulative_tokens,
            "Agent run complete"
        );
        self.event_bus.publish(AgentEvent::RunComplete {
            session_id: session_id.clone(),
            steps: run.len(),
            converged: state.converged(),
            cumulative_tokens: state.cumulative_tokens,
        });

        self.memory().add(run.clone(), &session_id)?;
        Ok(run)
    }

    /// Create a session. Returns `false` if it already existed.
    pub fn create_session(&self, session_id: &SessionId) -> bool {
        self.memory().create_session(session_id)
    }

    /// Delete a session and its runs. The default session cannot be deleted.
    pub fn delete_session(&self, session_id: &SessionId) -> Result<bool> {
        self.memory().delete_session(session_id)
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        self.memory().sessions()
    }

    /// Recorded runs of a session (the default session when `None`).
    pub fn session_runs(&self, session_id: Option<&SessionId>) -> Result<Vec<Run<AgentState>>> {
        let session_id = session_id.cloned().unwrap_or_default();
        Ok(self.memory().get_all_runs(&session_id)?.to_vec())
    }

    /// Forget the runs of one session, or of every session when `None`.
    pub fn reset_session(&self, session_id: Option<&SessionId>) -> Result<()> {
        self.memory().reset(session_id)
    }
}
