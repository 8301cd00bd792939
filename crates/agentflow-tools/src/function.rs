use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use agentflow_core::descriptor::{Describe, ParamSpec, TypeDescriptor};
use agentflow_core::error::{AgentflowError, Result};
use agentflow_core::traits::Action;

type Handler = Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// An action backed by a closure.
///
/// ```ignore
/// let lookup = FnAction::sync("lookup", "Look up a value.", |args| {
///     let x: i64 = required_arg(&args, "lookup", "x")?;
///     Ok(json!({ "value": x * 42 }))
/// })
/// .param(ParamSpec::of::<i64>("x"))
/// .returns(TypeDescriptor::mapping(TypeDescriptor::Integer));
/// ```
#[derive(Clone)]
pub struct FnAction {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    result_type: Option<TypeDescriptor>,
    timeout_secs: u64,
    handler: Handler,
}

impl FnAction {
    /// Wrap an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            params: vec![],
            result_type: None,
            timeout_secs: 30,
            handler: Arc::new(move |args| -> BoxFuture<'static, Result<Value>> {
                Box::pin(handler(args))
            }),
        }
    }

    /// Wrap a blocking closure. It runs inline on the calling task.
    pub fn sync<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(name, description, move |args| {
            let handler = Arc::clone(&handler);
            async move { handler(args) }
        })
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, ty: TypeDescriptor) -> Self {
        self.result_type = Some(ty);
        self
    }

    /// Declare the result type by inferring it from a Rust type.
    pub fn returns_type<T: Describe + ?Sized>(self) -> Self {
        self.returns(T::describe())
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Action for FnAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        self.params.clone()
    }

    fn result_type(&self) -> Option<TypeDescriptor> {
        self.result_type.clone()
    }

    fn call(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        (self.handler)(args)
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}

/// Extract and deserialize a required argument.
pub fn required_arg<T: DeserializeOwned>(
    args: &Map<String, Value>,
    action: &str,
    name: &str,
) -> Result<T> {
    let value = args
        .get(name)
        .ok_or_else(|| AgentflowError::InvalidArguments {
            action: action.to_string(),
            message: format!("missing required argument '{}'", name),
        })?;
    serde_json::from_value(value.clone()).map_err(|e| AgentflowError::InvalidArguments {
        action: action.to_string(),
        message: format!("argument '{}': {}", name, e),
    })
}

/// Extract and deserialize an optional argument. `null` counts as absent.
pub fn optional_arg<T: DeserializeOwned>(
    args: &Map<String, Value>,
    action: &str,
    name: &str,
) -> Result<Option<T>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => required_arg(args, action, name).map(Some),
    }
}
