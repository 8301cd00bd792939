use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use agentflow_core::error::{AgentflowError, Result};
use agentflow_core::traits::Action;
use agentflow_core::types::ActionContract;

use crate::contract::{catalog_text, synthesize_contract};

/// Registry of available actions, in declaration order.
///
/// Every action is validated and its calling contract synthesized when it is
/// registered; a registry is read-only once handed to an agent.
#[derive(Default)]
pub struct ActionRegistry {
    actions: Vec<Arc<dyn Action>>,
    contracts: Vec<ActionContract>,
    index: HashMap<String, usize>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action.
    ///
    /// Fails if the action lacks a name, description, or result type, or if
    /// an action with the same name is already registered.
    pub fn register(&mut self, action: impl Action) -> Result<()> {
        self.register_arc(Arc::new(action))
    }

    /// Register a shared action.
    pub fn register_arc(&mut self, action: Arc<dyn Action>) -> Result<()> {
        let contract = synthesize_contract(action.as_ref())?;
        if self.index.contains_key(&contract.name) {
            return Err(AgentflowError::InvalidAction(format!(
                "action '{}' is already registered",
                contract.name
            )));
        }
        debug!(action = %contract.name, "Registered action");
        self.index.insert(contract.name.clone(), self.actions.len());
        self.actions.push(action);
        self.contracts.push(contract);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, action: impl Action) -> Result<Self> {
        self.register(action)?;
        Ok(self)
    }

    /// Get an action by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.index.get(name).map(|&i| Arc::clone(&self.actions[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered action names in declaration order.
    pub fn list(&self) -> Vec<&str> {
        self.contracts.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Calling contracts in declaration order.
    pub fn contracts(&self) -> &[ActionContract] {
        &self.contracts
    }

    /// Textual catalog for instruction messages.
    pub fn catalog(&self) -> String {
        catalog_text(&self.actions)
    }

    /// Execute an action by name, bounded by its timeout.
    pub async fn execute(&self, name: &str, args: Map<String, Value>) -> Result<Value> {
        let action = self
            .get(name)
            .ok_or_else(|| AgentflowError::ActionNotFound(name.to_string()))?;

        let timeout = std::time::Duration::from_secs(action.timeout_secs());

        match tokio::time::timeout(timeout, action.call(args)).await {
            Ok(result) => result,
            Err(_) => Err(AgentflowError::ActionTimeout {
                action: name.to_string(),
                timeout_secs: action.timeout_secs(),
            }),
        }
    }
}
