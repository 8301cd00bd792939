//! Mocks and fixtures shared by the agentflow test suites.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use agentflow_core::descriptor::{ParamSpec, TypeDescriptor};
use agentflow_core::error::{AgentflowError, Result};
use agentflow_core::traits::{Action, ModelClient};
use agentflow_core::types::{ActionContract, ActionRequest, Message, ModelReply};

/// One recorded model invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub actions: Vec<ActionContract>,
}

/// Model that replays a fixed script of replies, then answers with plain text.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ModelReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(vec![]),
        }
    }

    /// Number of times `invoke` was called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Every recorded invocation, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

impl ModelClient for ScriptedModel {
    fn invoke(
        &self,
        messages: Vec<Message>,
        actions: Vec<ActionContract>,
    ) -> BoxFuture<'_, Result<ModelReply>> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall { messages, actions });
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ModelReply::text("done"));
        Box::pin(async move { Ok(reply) })
    }
}

/// Model that always requests the same action, never converging on its own.
pub struct LoopingModel {
    request: ActionRequest,
    calls: AtomicUsize,
}

impl LoopingModel {
    pub fn new(name: &str, arguments: Value) -> Self {
        Self {
            request: ActionRequest::new("loop", name, arguments),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelClient for LoopingModel {
    fn invoke(
        &self,
        _messages: Vec<Message>,
        _actions: Vec<ActionContract>,
    ) -> BoxFuture<'_, Result<ModelReply>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut request = self.request.clone();
        request.id = format!("loop_{}", n);
        Box::pin(async move { Ok(ModelReply::actions(vec![request])) })
    }
}

/// Model whose every call fails with `AgentflowError::Model`.
pub struct FailingModel {
    message: String,
    calls: AtomicUsize,
}

impl FailingModel {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelClient for FailingModel {
    fn invoke(
        &self,
        _messages: Vec<Message>,
        _actions: Vec<ActionContract>,
    ) -> BoxFuture<'_, Result<ModelReply>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let message = self.message.clone();
        Box::pin(async move { Err(AgentflowError::Model(message)) })
    }
}

/// Model that never answers.
pub struct HangingModel;

impl ModelClient for HangingModel {
    fn invoke(
        &self,
        _messages: Vec<Message>,
        _actions: Vec<ActionContract>,
    ) -> BoxFuture<'_, Result<ModelReply>> {
        Box::pin(futures::future::pending())
    }
}

/// Action spy: returns a fixed value and counts invocations.
pub struct CountingAction {
    name: String,
    description: String,
    result: Value,
    fail_with: Option<String>,
    calls: AtomicUsize,
    seen_args: Mutex<Vec<Map<String, Value>>>,
}

impl CountingAction {
    pub fn new(name: &str, result: Value) -> Self {
        Self {
            name: name.to_string(),
            description: format!("Test action {}", name),
            result,
            fail_with: None,
            calls: AtomicUsize::new(0),
            seen_args: Mutex::new(vec![]),
        }
    }

    /// A spy whose every call fails with the given message.
    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(name, Value::Null)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_args(&self) -> Vec<Map<String, Value>> {
        self.seen_args.lock().unwrap().clone()
    }
}

impl Action for CountingAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::new("x", TypeDescriptor::optional(TypeDescriptor::Integer))]
    }

    fn result_type(&self) -> Option<TypeDescriptor> {
        Some(TypeDescriptor::mapping(TypeDescriptor::Integer))
    }

    fn call(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_args.lock().unwrap().push(args);
        let outcome = match &self.fail_with {
            Some(message) => Err(AgentflowError::ActionExecution {
                action: self.name.clone(),
                message: message.clone(),
            }),
            None => Ok(self.result.clone()),
        };
        Box::pin(async move { outcome })
    }
}

/// `lookup` request fixture with the given id and `x` argument.
pub fn lookup_request(id: &str, x: i64) -> ActionRequest {
    ActionRequest::new(id, "lookup", json!({ "x": x }))
}
