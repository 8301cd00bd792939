use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentflowError {
    // Model collaborator errors
    #[error("Model request failed: {0}")]
    Model(String),

    #[error("Model call timed out after {0}s")]
    ModelTimeout(u64),

    // Action errors
    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("Action execution failed: {action}: {message}")]
    ActionExecution { action: String, message: String },

    #[error("Action timeout after {timeout_secs}s: {action}")]
    ActionTimeout { action: String, timeout_secs: u64 },

    #[error("Invalid arguments for action {action}: {message}")]
    InvalidArguments { action: String, message: String },

    #[error("Invalid action definition: {0}")]
    InvalidAction(String),

    // Graph errors
    #[error("Unknown phase: {0}")]
    UnknownPhase(String),

    #[error("Phase {phase} broke the state contract: {message}")]
    PhaseContract { phase: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentflowError {
    /// Whether this error stems from graph or registry configuration.
    /// Configuration errors are never retried.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::ConfigNotFound(_)
                | Self::InvalidAction(_)
                | Self::UnknownPhase(_)
                | Self::PhaseContract { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentflowError>;
