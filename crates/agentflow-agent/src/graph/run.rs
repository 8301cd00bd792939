use chrono::{DateTime, Utc};
use uuid::Uuid;

use agentflow_core::types::SessionId;

use super::phase::{PhaseId, PhaseState};

/// One executed phase and the state it produced.
#[derive(Debug, Clone)]
pub struct RunStep<S> {
    pub phase: PhaseId,
    pub state: S,
}

/// Immutable record of one pass through a state machine.
///
/// Steps are in execution order, starting at the entry phase and ending at a
/// terminal phase.
#[derive(Debug, Clone)]
pub struct Run<S> {
    id: Uuid,
    session_id: SessionId,
    steps: Vec<RunStep<S>>,
    final_state: S,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl<S: PhaseState> Run<S> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn steps(&self) -> &[RunStep<S>] {
        &self.steps
    }

    /// State produced by the terminal phase.
    pub fn final_state(&self) -> &S {
        &self.final_state
    }

    /// Executed phase ids in order.
    pub fn phase_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.phase.as_str()).collect()
    }

    /// How often `phase` was executed.
    pub fn visits(&self, phase: &str) -> usize {
        self.steps.iter().filter(|s| s.phase == phase).count()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Collects steps while a run is in progress.
pub(crate) struct RunRecorder<S> {
    session_id: SessionId,
    steps: Vec<RunStep<S>>,
    started_at: DateTime<Utc>,
}

impl<S: PhaseState> RunRecorder<S> {
    pub(crate) fn start(session_id: SessionId) -> Self {
        Self {
            session_id,
            steps: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub(crate) fn record(&mut self, phase: &str, state: &S) {
        self.steps.push(RunStep {
            phase: phase.to_string(),
            state: state.clone(),
        });
    }

    pub(crate) fn finish(self, final_state: S) -> Run<S> {
        Run {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            steps: self.steps,
            final_state,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
