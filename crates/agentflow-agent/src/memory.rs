use std::collections::HashMap;

use tracing::debug;

use agentflow_core::error::{AgentflowError, Result};
use agentflow_core::types::SessionId;

use crate::graph::{PhaseState, Run};

/// Runs recorded per session, oldest first.
///
/// The `default` session always exists and cannot be deleted.
pub struct SessionMemory<S> {
    sessions: HashMap<SessionId, Vec<Run<S>>>,
}

impl<S: PhaseState> SessionMemory<S> {
    pub fn new() -> Self {
        let mut sessions = HashMap::new();
        sessions.insert(SessionId::default_session(), Vec::new());
        Self { sessions }
    }

    /// Create a session. Returns `false` if it already existed.
    pub fn create_session(&mut self, id: &SessionId) -> bool {
        if self.sessions.contains_key(id) {
            return false;
        }
        debug!(session = %id, "Created session");
        self.sessions.insert(id.clone(), Vec::new());
        true
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Remove a session and its runs. Returns `false` if it did not exist.
    pub fn delete_session(&mut self, id: &SessionId) -> Result<bool> {
        if *id == SessionId::default_session() {
            return Err(AgentflowError::Config(
                "the default session cannot be deleted".to_string(),
            ));
        }
        Ok(self.sessions.remove(id).is_some())
    }

    /// Known session ids, sorted.
    pub fn sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Append a run to a session.
    pub fn add(&mut self, run: Run<S>, id: &SessionId) -> Result<()> {
        let runs = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| AgentflowError::SessionNotFound(id.to_string()))?;
        runs.push(run);
        Ok(())
    }

    /// Every run of a session, oldest first.
    pub fn get_all_runs(&self, id: &SessionId) -> Result<&[Run<S>]> {
        self.sessions
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| AgentflowError::SessionNotFound(id.to_string()))
    }

    pub fn last_run(&self, id: &SessionId) -> Option<&Run<S>> {
        self.sessions.get(id).and_then(|runs| runs.last())
    }

    /// Remove and return the latest run of a session.
    pub fn pop(&mut self, id: &SessionId) -> Option<Run<S>> {
        self.sessions.get_mut(id).and_then(Vec::pop)
    }

    /// Clear the runs of one session, or of every session when `id` is `None`.
    /// Sessions themselves are kept.
    pub fn reset(&mut self, id: Option<&SessionId>) -> Result<()> {
        match id {
            Some(id) => {
                let runs = self
                    .sessions
                    .get_mut(id)
                    .ok_or_else(|| AgentflowError::SessionNotFound(id.to_string()))?;
                runs.clear();
            }
            None => self.sessions.values_mut().for_each(Vec::clear),
        }
        Ok(())
    }
}

impl<S: PhaseState> Default for SessionMemory<S> {
    fn default() -> Self {
        Self::new()
    }
}
