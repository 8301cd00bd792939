use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AgentflowError, Result};

/// Top-level agentflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// How the action budget is counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationPolicy {
    /// Every executed action call consumes one unit of budget.
    #[default]
    PerActionCall,
    /// Every dispatch cycle consumes one unit, however many calls it runs.
    PerCycle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base instructions for the instruction message.
    #[serde(default)]
    pub instructions: String,
    /// Action budget per run, counted according to `iteration_policy`.
    #[serde(default = "default_max_action_calls")]
    pub max_action_calls: usize,
    #[serde(default)]
    pub iteration_policy: IterationPolicy,
    /// Hard ceiling on dispatch cycles per run, regardless of policy.
    #[serde(default = "default_max_dispatch_cycles")]
    pub max_dispatch_cycles: usize,
    /// Refuse identical calls (same action key) within a run.
    #[serde(default = "default_true")]
    pub dedupe_actions: bool,
    /// Replay the first result for identical calls instead of refusing.
    #[serde(default = "default_true")]
    pub cache_results: bool,
    /// Append the action catalog to the instructions.
    #[serde(default = "default_true")]
    pub include_action_docs: bool,
    /// Append the no-repeat policy to the instructions.
    #[serde(default = "default_true")]
    pub discourage_repeats: bool,
    /// Timeout for a single model call (unset = no timeout).
    #[serde(default)]
    pub model_timeout_secs: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            max_action_calls: default_max_action_calls(),
            iteration_policy: IterationPolicy::default(),
            max_dispatch_cycles: default_max_dispatch_cycles(),
            dedupe_actions: true,
            cache_results: true,
            include_action_docs: true,
            discourage_repeats: true,
            model_timeout_secs: None,
        }
    }
}

fn default_true() -> bool { true }
fn default_max_action_calls() -> usize { 2 }
fn default_max_dispatch_cycles() -> usize { 8 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// Input budget; leaves room for output. Defaults to 85% of the context.
    #[serde(default)]
    pub input_budget_tokens: Option<usize>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl ModelConfig {
    /// Effective input budget in tokens.
    pub fn input_budget(&self) -> usize {
        self.input_budget_tokens
            .unwrap_or(self.max_context_tokens * 85 / 100)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            max_context_tokens: default_max_context_tokens(),
            input_budget_tokens: None,
            retry: None,
        }
    }
}

fn default_model_id() -> String { "gpt-4o-mini".to_string() }
fn default_max_context_tokens() -> usize { 128_000 }

/// Retry configuration for model requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Include the event target (module path) in log lines.
    #[serde(default)]
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            with_target: false,
        }
    }
}

fn default_log_filter() -> String { "agentflow=info,warn".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| AgentflowError::ConfigNotFound(path.display().to_string()))?;
        let config = Self::from_toml_str(&content)?;
        debug!(
            path = %path.display(),
            model = %config.model.model_id,
            max_action_calls = config.agent.max_action_calls,
            "Loaded config"
        );
        Ok(config)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| AgentflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.agent.max_dispatch_cycles == 0 {
            return Err(AgentflowError::Config(
                "agent.max_dispatch_cycles must be at least 1".into(),
            ));
        }
        if self.model.input_budget() > self.model.max_context_tokens {
            return Err(AgentflowError::Config(format!(
                "model.input_budget_tokens ({}) exceeds max_context_tokens ({})",
                self.model.input_budget(),
                self.model.max_context_tokens
            )));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
