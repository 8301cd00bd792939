use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};

use agentflow_core::config::{AgentConfig, IterationPolicy};
use agentflow_core::error::Result;
use agentflow_core::event::EventBus;
use agentflow_core::types::{ActionRequest, ActionStatus, AgentEvent, Message};
use agentflow_tools::ActionRegistry;

use crate::graph::Phase;
use crate::state::AgentState;

/// Phase id of the dispatch phase.
pub const DISPATCH: &str = "dispatch";

/// Identity of a call within a run: `name|canonical-arguments`.
///
/// `null` arguments run as `{}` and share its key.
pub fn action_key(request: &ActionRequest) -> String {
    let args = match &request.arguments {
        Value::Null => "{}".to_string(),
        other => canonical_json(other),
    };
    format!("{}|{}", request.name, args)
}

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub(crate) fn error_body(status: ActionStatus, message: &str) -> String {
    json!({ "status": status.as_str(), "error": message }).to_string()
}

/// Executes pending action requests under the run's budget, dedupe and
/// cache rules. Every request yields exactly one result message.
pub struct DispatchPhase {
    registry: Arc<ActionRegistry>,
    events: Arc<EventBus>,
    policy: IterationPolicy,
    max_action_calls: usize,
    dedupe: bool,
    cache: bool,
}

impl DispatchPhase {
    pub fn new(registry: Arc<ActionRegistry>, config: &AgentConfig, events: Arc<EventBus>) -> Self {
        Self {
            registry,
            events,
            policy: config.iteration_policy,
            max_action_calls: config.max_action_calls,
            dedupe: config.dedupe_actions,
            cache: config.cache_results,
        }
    }

    fn budget_spent(&self, state: &AgentState) -> bool {
        match self.policy {
            IterationPolicy::PerActionCall => state.action_calls >= self.max_action_calls,
            IterationPolicy::PerCycle => state.dispatch_cycles > self.max_action_calls,
        }
    }

    pub async fn dispatch(&self, mut state: AgentState) -> AgentState {
        state.dispatch_cycles += 1;
        let requests = std::mem::take(&mut state.pending_actions);
        debug!(
            cycle = state.dispatch_cycles,
            requests = requests.len(),
            "Dispatching actions"
        );

        for request in requests {
            self.events.publish(AgentEvent::ActionStart {
                name: request.name.clone(),
                arguments: request.arguments.clone(),
            });
            let (status, content) = self.resolve(&mut state, &request).await;
            self.events.publish(AgentEvent::ActionEnd {
                name: request.name.clone(),
                status,
            });
            state
                .messages
                .push(Message::action_result(&request, status, content));
        }
        state
    }

    async fn resolve(&self, state: &mut AgentState, request: &ActionRequest) -> (ActionStatus, String) {
        let key = action_key(request);

        if self.budget_spent(state) {
            state.budget_exhausted = true;
            warn!(action = %request.name, calls = state.action_calls, "Action budget exhausted");
            let status = ActionStatus::BudgetExhausted;
            return (status, error_body(status, "action budget exhausted for this run"));
        }

        if self.dedupe && state.seen_actions.contains(&key) {
            if self.cache {
                if let Some(cached) = state.result_cache.get(&key) {
                    debug!(action = %request.name, "Replaying cached result");
                    return (ActionStatus::Success, cached.clone());
                }
            }
            warn!(action = %request.name, "Refusing duplicate action call");
            let status = ActionStatus::DuplicateCall;
            return (
                status,
                error_body(status, "identical call already made in this run"),
            );
        }

        let args = match &request.arguments {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            _ => {
                return (
                    ActionStatus::Failed,
                    error_body(ActionStatus::Failed, "arguments must be a JSON object"),
                );
            }
        };
        if !self.registry.contains(&request.name) {
            warn!(action = %request.name, "Model requested an unknown action");
            return (
                ActionStatus::Failed,
                error_body(
                    ActionStatus::Failed,
                    &format!("unknown action '{}'", request.name),
                ),
            );
        }

        state.action_calls += 1;
        match self.registry.execute(&request.name, args).await {
            Ok(value) => {
                let content = value.to_string();
                state.seen_actions.insert(key.clone());
                if self.cache {
                    state.result_cache.insert(key, content.clone());
                }
                (ActionStatus::Success, content)
            }
            Err(e) => {
                error!(action = %request.name, error = %e, "Action failed");
                (ActionStatus::Failed, error_body(ActionStatus::Failed, &e.to_string()))
            }
        }
    }
}

impl Phase<AgentState> for DispatchPhase {
    fn id(&self) -> &str {
        DISPATCH
    }

    fn apply(&self, state: AgentState) -> BoxFuture<'_, Result<AgentState>> {
        Box::pin(async move { Ok(self.dispatch(state).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::types::SessionId;
    use agentflow_test_utils::{lookup_request, CountingAction};

    fn setup(config: AgentConfig) -> (DispatchPhase, Arc<CountingAction>) {
        let spy = Arc::new(CountingAction::new("lookup", json!({"value": 42})));
        let mut registry = ActionRegistry::new();
        registry.register_arc(spy.clone()).unwrap();
        let phase = DispatchPhase::new(Arc::new(registry), &config, Arc::new(EventBus::default()));
        (phase, spy)
    }

    fn state_with(requests: Vec<ActionRequest>) -> AgentState {
        let mut s = AgentState::new(SessionId::default(), "q", "");
        s.pending_actions = requests;
        s
    }

    fn statuses(state: &AgentState) -> Vec<ActionStatus> {
        state.action_results().filter_map(|m| m.status).collect()
    }

    #[test]
    fn test_action_key_ignores_key_order() {
        let a = ActionRequest::new("1", "f", json!({"b": 1, "a": {"y": 2, "x": [3, {"d": 4, "c": 5}]}}));
        let b = ActionRequest::new("2", "f", json!({"a": {"x": [3, {"c": 5, "d": 4}], "y": 2}, "b": 1}));
        assert_eq!(action_key(&a), action_key(&b));
        assert_eq!(action_key(&a), r#"f|{"a":{"x":[3,{"c":5,"d":4}],"y":2},"b":1}"#);
    }

    #[test]
    fn test_action_key_distinguishes_value_types() {
        let a = ActionRequest::new("1", "f", json!({"x": 1}));
        let b = ActionRequest::new("1", "f", json!({"x": "1"}));
        assert_ne!(action_key(&a), action_key(&b));
    }

    #[tokio::test]
    async fn test_null_and_empty_arguments_dedupe() {
        let (phase, spy) = setup(AgentConfig {
            max_action_calls: 5,
            ..Default::default()
        });
        let null_args = ActionRequest::new("c1", "lookup", Value::Null);
        let empty_args = ActionRequest::new("c2", "lookup", json!({}));
        assert_eq!(action_key(&null_args), action_key(&empty_args));

        let out = phase.dispatch(state_with(vec![null_args, empty_args])).await;
        assert_eq!(spy.call_count(), 1);
        assert_eq!(statuses(&out), vec![ActionStatus::Success, ActionStatus::Success]);
    }

    #[tokio::test]
    async fn test_executes_and_counts() {
        let (phase, spy) = setup(AgentConfig::default());
        let out = phase.dispatch(state_with(vec![lookup_request("c1", 1)])).await;
        assert_eq!(spy.call_count(), 1);
        assert_eq!(out.action_calls, 1);
        assert_eq!(out.dispatch_cycles, 1);
        assert!(out.pending_actions.is_empty());
        let result = out.action_results().next().unwrap();
        assert_eq!(result.action_result_for.as_deref(), Some("c1"));
        assert_eq!(result.content, r#"{"value":42}"#);
    }

    #[tokio::test]
    async fn test_cached_replay_skips_callable() {
        let (phase, spy) = setup(AgentConfig {
            max_action_calls: 5,
            ..Default::default()
        });
        let out = phase
            .dispatch(state_with(vec![lookup_request("c1", 1), lookup_request("c2", 1)]))
            .await;
        assert_eq!(spy.call_count(), 1);
        assert_eq!(out.action_calls, 1);
        let results: Vec<_> = out.action_results().collect();
        assert_eq!(results[0].content, results[1].content);
        assert_eq!(statuses(&out), vec![ActionStatus::Success, ActionStatus::Success]);
    }

    #[tokio::test]
    async fn test_duplicate_refused_without_cache() {
        let (phase, spy) = setup(AgentConfig {
            cache_results: false,
            max_action_calls: 5,
            ..Default::default()
        });
        let out = phase
            .dispatch(state_with(vec![lookup_request("c1", 1), lookup_request("c2", 1)]))
            .await;
        assert_eq!(spy.call_count(), 1);
        assert_eq!(statuses(&out), vec![ActionStatus::Success, ActionStatus::DuplicateCall]);
        assert!(out.result_cache.is_empty());
        let refusal: Value = serde_json::from_str(&out.messages[1].content).unwrap();
        assert_eq!(refusal["status"], "duplicate_call");
    }

    #[tokio::test]
    async fn test_dedupe_off_executes_every_call() {
        let (phase, spy) = setup(AgentConfig {
            dedupe_actions: false,
            max_action_calls: 5,
            ..Default::default()
        });
        phase
            .dispatch(state_with(vec![lookup_request("c1", 1), lookup_request("c2", 1)]))
            .await;
        assert_eq!(spy.call_count(), 2);
    }

    #[tokio::test]
    async fn test_budget_refusal_never_reaches_callable() {
        let (phase, spy) = setup(AgentConfig {
            max_action_calls: 2,
            ..Default::default()
        });
        let requests = (1..=4).map(|x| lookup_request(&format!("c{}", x), x)).collect();
        let out = phase.dispatch(state_with(requests)).await;
        assert_eq!(spy.call_count(), 2);
        assert_eq!(out.action_calls, 2);
        assert!(out.budget_exhausted);
        assert_eq!(
            statuses(&out),
            vec![
                ActionStatus::Success,
                ActionStatus::Success,
                ActionStatus::BudgetExhausted,
                ActionStatus::BudgetExhausted,
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_budget_refuses_everything() {
        let (phase, spy) = setup(AgentConfig {
            max_action_calls: 0,
            ..Default::default()
        });
        let out = phase.dispatch(state_with(vec![lookup_request("c1", 1)])).await;
        assert_eq!(spy.call_count(), 0);
        assert_eq!(statuses(&out), vec![ActionStatus::BudgetExhausted]);
    }

    #[tokio::test]
    async fn test_per_cycle_policy_counts_cycles() {
        let (phase, spy) = setup(AgentConfig {
            max_action_calls: 1,
            iteration_policy: IterationPolicy::PerCycle,
            ..Default::default()
        });
        let first = phase
            .dispatch(state_with(vec![lookup_request("c1", 1), lookup_request("c2", 2)]))
            .await;
        assert_eq!(spy.call_count(), 2);
        assert!(!first.budget_exhausted);

        let mut again = first;
        again.pending_actions = vec![lookup_request("c3", 3)];
        let second = phase.dispatch(again).await;
        assert_eq!(spy.call_count(), 2);
        assert!(second.budget_exhausted);
    }

    #[tokio::test]
    async fn test_unknown_action_fails_without_counting() {
        let (phase, _spy) = setup(AgentConfig::default());
        let out = phase
            .dispatch(state_with(vec![ActionRequest::new("c1", "missing", json!({}))]))
            .await;
        assert_eq!(out.action_calls, 0);
        assert_eq!(statuses(&out), vec![ActionStatus::Failed]);
        assert!(out.messages[0].content.contains("unknown action 'missing'"));
    }

    #[tokio::test]
    async fn test_non_object_arguments_fail() {
        let (phase, spy) = setup(AgentConfig::default());
        let out = phase
            .dispatch(state_with(vec![ActionRequest::new("c1", "lookup", json!([1, 2]))]))
            .await;
        assert_eq!(spy.call_count(), 0);
        assert_eq!(statuses(&out), vec![ActionStatus::Failed]);
    }

    #[tokio::test]
    async fn test_callable_error_is_reported_not_cached() {
        let spy = Arc::new(CountingAction::failing("lookup", "backend offline"));
        let mut registry = ActionRegistry::new();
        registry.register_arc(spy.clone()).unwrap();
        let phase = DispatchPhase::new(
            Arc::new(registry),
            &AgentConfig::default(),
            Arc::new(EventBus::default()),
        );
        let out = phase
            .dispatch(state_with(vec![lookup_request("c1", 1), lookup_request("c2", 1)]))
            .await;
        assert_eq!(spy.call_count(), 2);
        assert_eq!(statuses(&out), vec![ActionStatus::Failed, ActionStatus::Failed]);
        assert!(out.messages[0].content.contains("backend offline"));
        assert!(out.seen_actions.is_empty());
    }

    #[tokio::test]
    async fn test_publishes_action_events() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let mut registry = ActionRegistry::new();
        registry
            .register(CountingAction::new("lookup", json!({"value": 42})))
            .unwrap();
        let phase = DispatchPhase::new(Arc::new(registry), &AgentConfig::default(), Arc::clone(&bus));
        phase.dispatch(state_with(vec![lookup_request("c1", 1)])).await;

        assert!(matches!(rx.try_recv(), Ok(AgentEvent::ActionStart { ref name, .. }) if name == "lookup"));
        assert!(matches!(
            rx.try_recv(),
            Ok(AgentEvent::ActionEnd { status: ActionStatus::Success, .. })
        ));
    }
}
