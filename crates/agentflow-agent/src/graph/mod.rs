//! Graph state machine.
//!
//! A graph is a set of [`Phase`]s joined by [`Transition`]s. Exactly one
//! phase is the entry and at least one is terminal. [`StateMachine::run`]
//! moves a state through the graph, one phase at a time, and returns an
//! immutable [`Run`] holding every intermediate state.

pub mod machine;
pub mod phase;
pub mod run;
pub mod transition;

pub use machine::{StateMachine, StateMachineBuilder};
pub use phase::{
    EntryPoint, FnPhase, Phase, PhaseId, PhaseKind, PhaseState, Termination, ENTRY, TERMINATION,
};
pub use run::{Run, RunStep};
pub use transition::{Selector, Transition};
