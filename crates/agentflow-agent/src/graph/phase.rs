use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use agentflow_core::error::Result;
use agentflow_core::types::SessionId;

/// Identifier of a phase within a graph.
pub type PhaseId = String;

/// Reserved id of the built-in entry phase.
pub const ENTRY: &str = "__entry__";
/// Reserved id of the built-in terminal phase.
pub const TERMINATION: &str = "__termination__";

/// State carried between phases.
///
/// States are moved into each phase and a new state is moved out. Every phase
/// must hand back the session identity it received.
pub trait PhaseState: Clone + Send + Sync + 'static {
    fn session_id(&self) -> &SessionId;
}

/// Role of a phase in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    /// Start of every run. Identity transform, exactly one outgoing edge.
    Entry,
    /// Ordinary state transform.
    Step,
    /// End of a run. Identity transform, no outgoing edges.
    Terminal,
}

/// A named state transform.
pub trait Phase<S: PhaseState>: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> PhaseKind {
        PhaseKind::Step
    }

    fn apply(&self, state: S) -> BoxFuture<'_, Result<S>>;
}

/// The entry phase. Passes state through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryPoint;

impl<S: PhaseState> Phase<S> for EntryPoint {
    fn id(&self) -> &str {
        ENTRY
    }

    fn kind(&self) -> PhaseKind {
        PhaseKind::Entry
    }

    fn apply(&self, state: S) -> BoxFuture<'_, Result<S>> {
        Box::pin(async move { Ok(state) })
    }
}

/// A terminal phase. Passes state through unchanged.
#[derive(Debug, Clone)]
pub struct Termination {
    id: PhaseId,
}

impl Termination {
    pub fn new() -> Self {
        Self::named(TERMINATION)
    }

    /// A terminal phase with a custom id, for graphs with several exits.
    pub fn named(id: impl Into<PhaseId>) -> Self {
        Self { id: id.into() }
    }
}

impl Default for Termination {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PhaseState> Phase<S> for Termination {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> PhaseKind {
        PhaseKind::Terminal
    }

    fn apply(&self, state: S) -> BoxFuture<'_, Result<S>> {
        Box::pin(async move { Ok(state) })
    }
}

type Transform<S> = Arc<dyn Fn(S) -> BoxFuture<'static, Result<S>> + Send + Sync>;

/// A step backed by a closure.
pub struct FnPhase<S> {
    id: PhaseId,
    transform: Transform<S>,
}

impl<S: PhaseState> FnPhase<S> {
    pub fn new<F, Fut>(id: impl Into<PhaseId>, f: F) -> Self
    where
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S>> + Send + 'static,
    {
        Self {
            id: id.into(),
            transform: Arc::new(move |state| -> BoxFuture<'static, Result<S>> {
                Box::pin(f(state))
            }),
        }
    }

    /// A step from an infallible synchronous transform.
    pub fn sync<F>(id: impl Into<PhaseId>, f: F) -> Self
    where
        F: Fn(S) -> S + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(id, move |state| {
            let f = Arc::clone(&f);
            async move { Result::<S>::Ok(f(state)) }
        })
    }
}

impl<S: PhaseState> Phase<S> for FnPhase<S> {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&self, state: S) -> BoxFuture<'_, Result<S>> {
        (self.transform)(state)
    }
}
