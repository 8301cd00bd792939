use tracing_subscriber::EnvFilter;

use agentflow_core::config::LogConfig;
use agentflow_core::error::{AgentflowError, Result};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` overrides `config.filter` when set. Fails if a subscriber is
/// already installed.
pub fn init(config: &LogConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter)),
        )
        .with_target(config.with_target)
        .try_init()
        .map_err(|e| AgentflowError::Config(format!("logging already initialized: {}", e)))
}
