use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use agentflow_core::error::{AgentflowError, Result};
use agentflow_core::event::EventBus;
use agentflow_core::types::{AgentEvent, SessionId};

use super::phase::{Phase, PhaseId, PhaseKind, PhaseState};
use super::run::{Run, RunRecorder};
use super::transition::Transition;

/// Assembles and validates a [`StateMachine`].
pub struct StateMachineBuilder<S> {
    phases: Vec<Arc<dyn Phase<S>>>,
    transitions: Vec<Transition<S>>,
    events: Option<Arc<EventBus>>,
}

impl<S: PhaseState> Default for StateMachineBuilder<S> {
    fn default() -> Self {
        Self {
            phases: Vec::new(),
            transitions: Vec::new(),
            events: None,
        }
    }
}

impl<S: PhaseState> StateMachineBuilder<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(self, phase: impl Phase<S> + 'static) -> Self {
        self.phase_arc(Arc::new(phase))
    }

    pub fn phase_arc(mut self, phase: Arc<dyn Phase<S>>) -> Self {
        self.phases.push(phase);
        self
    }

    /// Unconditional edge `from -> to`.
    pub fn edge(self, from: impl Into<PhaseId>, to: impl Into<PhaseId>) -> Self {
        self.transition(Transition::always(from, to))
    }

    /// Conditional edges out of `from`, routed by `selector`.
    pub fn select<I, T, F>(self, from: impl Into<PhaseId>, candidates: I, selector: F) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<PhaseId>,
        F: Fn(&S) -> PhaseId + Send + Sync + 'static,
    {
        let candidates = candidates.into_iter().map(Into::into).collect();
        self.transition(Transition::select(from, candidates, selector))
    }

    pub fn transition(mut self, transition: Transition<S>) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Publish a `PhaseEntered` event for every executed phase.
    pub fn events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Validate the graph.
    ///
    /// Every structural problem is reported in a single `Config` error.
    pub fn build(self) -> Result<StateMachine<S>> {
        let mut problems = Vec::new();

        let mut phases: HashMap<PhaseId, Arc<dyn Phase<S>>> = HashMap::new();
        let mut order = Vec::new();
        for phase in self.phases {
            let id = phase.id().to_string();
            if phases.contains_key(&id) {
                problems.push(format!("phase '{}' is declared twice", id));
                continue;
            }
            order.push(id.clone());
            phases.insert(id, phase);
        }

        let entries: Vec<&PhaseId> = order
            .iter()
            .filter(|id| phases[*id].kind() == PhaseKind::Entry)
            .collect();
        let entry = match entries.as_slice() {
            [only] => Some((*only).clone()),
            [] => {
                problems.push("graph has no entry phase".to_string());
                None
            }
            many => {
                problems.push(format!("graph has {} entry phases", many.len()));
                None
            }
        };
        let terminals: HashSet<PhaseId> = order
            .iter()
            .filter(|id| phases[*id].kind() == PhaseKind::Terminal)
            .cloned()
            .collect();
        if terminals.is_empty() {
            problems.push("graph has no terminal phase".to_string());
        }

        let mut transitions: HashMap<PhaseId, Transition<S>> = HashMap::new();
        for t in self.transitions {
            let Some(source) = phases.get(&t.from) else {
                problems.push(format!("transition from undeclared phase '{}'", t.from));
                continue;
            };
            match source.kind() {
                PhaseKind::Terminal => {
                    problems.push(format!("terminal phase '{}' has outgoing edges", t.from));
                }
                PhaseKind::Entry if t.candidates.len() != 1 => {
                    problems.push(format!(
                        "entry phase '{}' must have exactly one outgoing edge",
                        t.from
                    ));
                }
                _ => {}
            }
            if t.candidates.is_empty() {
                problems.push(format!("phase '{}' has a transition with no targets", t.from));
            }
            if t.candidates.len() > 1 && !t.has_selector() {
                problems.push(format!(
                    "phase '{}' has {} candidates and no selector",
                    t.from,
                    t.candidates.len()
                ));
            }
            for target in &t.candidates {
                match phases.get(target) {
                    None => problems.push(format!(
                        "edge '{}' -> '{}' targets an undeclared phase",
                        t.from, target
                    )),
                    Some(p) if p.kind() == PhaseKind::Entry => problems.push(format!(
                        "edge '{}' -> '{}' points back to the entry phase",
                        t.from, target
                    )),
                    Some(_) => {}
                }
            }
            if transitions.contains_key(&t.from) {
                problems.push(format!("phase '{}' has more than one transition", t.from));
                continue;
            }
            transitions.insert(t.from.clone(), t);
        }

        for id in &order {
            if !terminals.contains(id) && !transitions.contains_key(id) {
                problems.push(format!("phase '{}' has no outgoing transition", id));
            }
        }

        match entry {
            Some(entry) if problems.is_empty() => Ok(StateMachine {
                phases,
                transitions,
                entry,
                order,
                events: self.events,
            }),
            _ => Err(AgentflowError::Config(problems.join("; "))),
        }
    }
}

/// A validated graph of phases.
///
/// [`StateMachine::run`] walks the graph from the entry phase until a terminal
/// phase has been applied, recording every step.
pub struct StateMachine<S> {
    phases: HashMap<PhaseId, Arc<dyn Phase<S>>>,
    transitions: HashMap<PhaseId, Transition<S>>,
    entry: PhaseId,
    order: Vec<PhaseId>,
    events: Option<Arc<EventBus>>,
}

impl<S: PhaseState> StateMachine<S> {
    pub fn builder() -> StateMachineBuilder<S> {
        StateMachineBuilder::new()
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Declared phase ids in declaration order.
    pub fn phase_ids(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Execute the graph from `initial`.
    ///
    /// Any phase error aborts the run and is returned unchanged.
    pub async fn run(&self, initial: S) -> Result<Run<S>> {
        let session = initial.session_id().clone();
        let mut recorder = RunRecorder::start(session.clone());
        let mut current = self.entry.clone();
        let mut state = initial;

        info!(session = %session, "State machine run started");

        loop {
            let phase = self
                .phases
                .get(&current)
                .ok_or_else(|| AgentflowError::UnknownPhase(current.clone()))?;
            state = self.apply(phase.as_ref(), state, &session).await?;
            recorder.record(&current, &state);

            if phase.kind() == PhaseKind::Terminal {
                break;
            }

            let transition = self
                .transitions
                .get(&current)
                .ok_or_else(|| AgentflowError::UnknownPhase(current.clone()))?;
            let next = transition.resolve(&state)?;
            debug!(from = %current, to = %next, "Transition");
            current = next;
        }

        let run = recorder.finish(state);
        info!(session = %session, steps = run.len(), "State machine run complete");
        Ok(run)
    }

    async fn apply(&self, phase: &dyn Phase<S>, state: S, session: &SessionId) -> Result<S> {
        debug!(phase = %phase.id(), "Entering phase");
        if let Some(bus) = &self.events {
            bus.publish(AgentEvent::PhaseEntered {
                phase: phase.id().to_string(),
            });
        }

        let next = phase.apply(state).await?;
        if next.session_id() != session {
            return Err(AgentflowError::PhaseContract {
                phase: phase.id().to_string(),
                message: format!(
                    "session changed from '{}' to '{}'",
                    session,
                    next.session_id()
                ),
            });
        }
        Ok(next)
    }
}
