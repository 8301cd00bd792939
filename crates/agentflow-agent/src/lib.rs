pub mod agent;
pub mod budget;
pub mod context;
pub mod dispatch;
pub mod graph;
pub mod invoke;
pub mod memory;
pub mod nested;
pub mod state;

pub use agent::{Agent, PreparePhase, PREPARE};
pub use budget::{estimate_payload, estimate_tokens, prune_catalog, PruneOutcome};
pub use context::{build_instructions, ContextBuilder, NO_REPEAT_POLICY};
pub use dispatch::{action_key, DispatchPhase, DISPATCH};
pub use graph::{
    EntryPoint, FnPhase, Phase, PhaseId, PhaseKind, PhaseState, Run, RunStep, StateMachine,
    StateMachineBuilder, Termination, Transition, ENTRY, TERMINATION,
};
pub use invoke::{route_after_invoke, InvokePhase, INVOKE};
pub use memory::SessionMemory;
pub use nested::AgentAction;
pub use state::AgentState;
