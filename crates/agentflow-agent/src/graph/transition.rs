use std::fmt;
use std::sync::Arc;

use agentflow_core::error::{AgentflowError, Result};

use super::phase::{PhaseId, PhaseState};

/// Picks the next phase from the current state.
pub type Selector<S> = Arc<dyn Fn(&S) -> PhaseId + Send + Sync>;

/// Outgoing edges of one phase.
///
/// A transition with a single candidate needs no selector. With several
/// candidates, the selector decides, and its answer must be one of them.
pub struct Transition<S> {
    pub from: PhaseId,
    pub candidates: Vec<PhaseId>,
    selector: Option<Selector<S>>,
}

impl<S: PhaseState> Transition<S> {
    /// An unconditional edge.
    pub fn always(from: impl Into<PhaseId>, to: impl Into<PhaseId>) -> Self {
        Self {
            from: from.into(),
            candidates: vec![to.into()],
            selector: None,
        }
    }

    /// A conditional edge set routed by `selector`.
    pub fn select<F>(from: impl Into<PhaseId>, candidates: Vec<PhaseId>, selector: F) -> Self
    where
        F: Fn(&S) -> PhaseId + Send + Sync + 'static,
    {
        Self {
            from: from.into(),
            candidates,
            selector: Some(Arc::new(selector)),
        }
    }

    pub fn has_selector(&self) -> bool {
        self.selector.is_some()
    }

    /// Resolve the next phase for `state`.
    pub fn resolve(&self, state: &S) -> Result<PhaseId> {
        match (&self.selector, self.candidates.as_slice()) {
            (None, [only]) => Ok(only.clone()),
            (None, _) => Err(AgentflowError::Config(format!(
                "phase '{}' has {} candidates and no selector",
                self.from,
                self.candidates.len()
            ))),
            (Some(selector), _) => {
                let next = selector(state);
                if self.candidates.contains(&next) {
                    Ok(next)
                } else {
                    Err(AgentflowError::UnknownPhase(format!(
                        "selector of '{}' chose '{}', expected one of [{}]",
                        self.from,
                        next,
                        self.candidates.join(", ")
                    )))
                }
            }
        }
    }
}

impl<S> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("candidates", &self.candidates)
            .field("selector", &self.selector.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::types::SessionId;

    #[derive(Clone)]
    struct Counter {
        session: SessionId,
        n: u32,
    }

    impl PhaseState for Counter {
        fn session_id(&self) -> &SessionId {
            &self.session
        }
    }

    fn state(n: u32) -> Counter {
        Counter {
            session: SessionId::default(),
            n,
        }
    }

    #[test]
    fn test_always_resolves_to_target() {
        let t = Transition::<Counter>::always("a", "b");
        assert_eq!(t.resolve(&state(0)).unwrap(), "b");
        assert!(!t.has_selector());
    }

    #[test]
    fn test_selector_routes_by_state() {
        let t = Transition::select("a", vec!["low".into(), "high".into()], |s: &Counter| {
            if s.n > 3 { "high".into() } else { "low".into() }
        });
        assert_eq!(t.resolve(&state(1)).unwrap(), "low");
        assert_eq!(t.resolve(&state(9)).unwrap(), "high");
    }

    #[test]
    fn test_selector_outside_candidates_is_fatal() {
        let t = Transition::select("a", vec!["b".into(), "c".into()], |_: &Counter| {
            "nowhere".into()
        });
        let err = t.resolve(&state(0)).unwrap_err();
        assert!(matches!(err, AgentflowError::UnknownPhase(_)));
        assert!(err.to_string().contains("nowhere"));
    }
}
