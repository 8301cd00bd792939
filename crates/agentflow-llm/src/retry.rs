use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use agentflow_core::config::RetryConfig;
use agentflow_core::error::{AgentflowError, Result};
use agentflow_core::traits::ModelClient;
use agentflow_core::types::*;

/// Whether a failed model call is worth another attempt.
pub fn is_retryable(e: &AgentflowError) -> bool {
    match e {
        AgentflowError::Model(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        // Deadline set by the caller; fatal.
        AgentflowError::ModelTimeout(_) => false,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `config.max_retries` extra attempts are spent.
///
/// Independent of the state machine: wrap any fallible collaborator call.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_retries = config.max_retries;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && attempt < max_retries => {
                let backoff = calculate_backoff(attempt, config);
                warn!(
                    attempt = attempt + 1,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying model request"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A model client that retries failed requests and falls back to alternative clients.
pub struct RetryingClient {
    primary: Arc<dyn ModelClient>,
    fallbacks: Vec<(String, Arc<dyn ModelClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(primary: Arc<dyn ModelClient>, retry_config: RetryConfig) -> Self {
        Self {
            primary,
            fallbacks: vec![],
            retry_config,
        }
    }

    /// Add a labelled fallback, tried once after the primary is exhausted.
    pub fn with_fallback(mut self, label: impl Into<String>, client: Arc<dyn ModelClient>) -> Self {
        self.fallbacks.push((label.into(), client));
        self
    }
}

impl ModelClient for RetryingClient {
    fn invoke(
        &self,
        messages: Vec<Message>,
        actions: Vec<ActionContract>,
    ) -> BoxFuture<'_, Result<ModelReply>> {
        Box::pin(async move {
            let primary = with_retry(&self.retry_config, || {
                self.primary.invoke(messages.clone(), actions.clone())
            })
            .await;

            let last_err = match primary {
                Ok(reply) => return Ok(reply),
                Err(e) => e,
            };

            // Primary exhausted, try fallbacks
            if !self.fallbacks.is_empty() {
                info!(error = %last_err, "Primary model exhausted, trying fallbacks");
            }
            for (label, client) in &self.fallbacks {
                match client.invoke(messages.clone(), actions.clone()).await {
                    Ok(reply) => {
                        info!(fallback = %label, "Fell back to alternative model");
                        return Ok(reply);
                    }
                    Err(e) => {
                        warn!(fallback = %label, error = %e, "Fallback model also failed");
                    }
                }
            }

            Err(last_err)
        })
    }
}
