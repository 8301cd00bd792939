use futures::future::BoxFuture;

use crate::descriptor::{ParamSpec, TypeDescriptor};
use crate::error::Result;
use crate::types::*;

/// Model collaborator: turns a conversation into a reply.
///
/// Implementations must not keep hidden conversational state between calls;
/// all continuity travels in `messages`.
pub trait ModelClient: Send + Sync + 'static {
    fn invoke(
        &self,
        messages: Vec<Message>,
        actions: Vec<ActionContract>,
    ) -> BoxFuture<'_, Result<ModelReply>>;
}

/// An external callable the model may request.
pub trait Action: Send + Sync + 'static {
    /// Action name (used in model action requests).
    fn name(&self) -> &str;

    /// Human-readable description. Must not be empty.
    fn description(&self) -> &str;

    /// Declared parameters, in presentation order.
    fn parameters(&self) -> Vec<ParamSpec> {
        vec![]
    }

    /// Declared result type. Registration rejects actions returning `None`.
    fn result_type(&self) -> Option<TypeDescriptor>;

    /// Execute the action with the given arguments.
    fn call(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Timeout in seconds for a single call.
    fn timeout_secs(&self) -> u64 {
        30
    }
}
