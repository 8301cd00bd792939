use tracing::debug;

use agentflow_core::config::AgentConfig;
use agentflow_tools::ActionRegistry;

/// Appended when repeats are discouraged.
pub const NO_REPEAT_POLICY: &str = "Do not call the same action with identical arguments more than once in a run. If results are insufficient, switch actions or ask a clarifying question.";

/// Assemble the instruction message text.
pub struct ContextBuilder {
    parts: Vec<String>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Add the caller's base instructions.
    pub fn with_base_prompt(mut self, prompt: &str) -> Self {
        if !prompt.trim().is_empty() {
            self.parts.push(prompt.trim().to_string());
        }
        self
    }

    /// Add the action catalog section.
    pub fn with_action_catalog(mut self, catalog: &str) -> Self {
        if !catalog.is_empty() {
            debug!(lines = catalog.lines().count(), "Added action catalog");
            self.parts
                .push(format!("Actions you can use:\n{}", catalog));
        }
        self
    }

    pub fn with_no_repeat_policy(mut self) -> Self {
        self.parts.push(NO_REPEAT_POLICY.to_string());
        self
    }

    pub fn build(self) -> String {
        self.parts.join("\n\n")
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Instruction text for an agent with the given configuration and actions.
///
/// The no-repeat policy only accompanies a non-empty action catalog.
pub fn build_instructions(config: &AgentConfig, registry: &ActionRegistry) -> String {
    let mut builder = ContextBuilder::new().with_base_prompt(&config.instructions);
    if config.include_action_docs && !registry.is_empty() {
        builder = builder.with_action_catalog(&registry.catalog());
        if config.discourage_repeats {
            builder = builder.with_no_repeat_policy();
        }
    }
    builder.build()
}
