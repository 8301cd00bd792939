use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use agentflow_core::config::{AgentConfig, ModelConfig};
use agentflow_core::error::{AgentflowError, Result};
use agentflow_core::event::EventBus;
use agentflow_core::traits::ModelClient;
use agentflow_core::types::{ActionStatus, AgentEvent, Message};
use agentflow_tools::ActionRegistry;

use crate::budget::prune_catalog;
use crate::dispatch::{error_body, DISPATCH};
use crate::graph::{Phase, PhaseId, TERMINATION};
use crate::state::AgentState;

/// Phase id of the model invocation phase.
pub const INVOKE: &str = "invoke";

/// Sends the conversation and the fitting part of the catalog to the model,
/// then records its reply.
pub struct InvokePhase {
    llm: Arc<dyn ModelClient>,
    registry: Arc<ActionRegistry>,
    events: Arc<EventBus>,
    input_budget: usize,
    timeout_secs: Option<u64>,
    max_dispatch_cycles: usize,
}

impl InvokePhase {
    pub fn new(
        llm: Arc<dyn ModelClient>,
        registry: Arc<ActionRegistry>,
        events: Arc<EventBus>,
        agent: &AgentConfig,
        model: &ModelConfig,
    ) -> Self {
        Self {
            llm,
            registry,
            events,
            input_budget: model.input_budget(),
            timeout_secs: agent.model_timeout_secs,
            max_dispatch_cycles: agent.max_dispatch_cycles,
        }
    }

    async fn invoke(&self, mut state: AgentState) -> Result<AgentState> {
        let pruned = prune_catalog(&state.messages, self.registry.contracts(), self.input_budget);
        if pruned.pruned() {
            warn!(
                dropped = ?pruned.dropped,
                estimate = pruned.estimate,
                budget = self.input_budget,
                "Pruned action catalog to fit input budget"
            );
            self.events.publish(AgentEvent::CatalogPruned {
                dropped: pruned.dropped.clone(),
                estimate: pruned.estimate,
                budget: self.input_budget,
            });
        }

        let call = self.llm.invoke(state.messages.clone(), pruned.kept);
        let reply = match self.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), call)
                .await
                .map_err(|_| AgentflowError::ModelTimeout(secs))??,
            None => call.await?,
        };

        let mut requests = reply.requested_actions;
        let turn = state.messages.len();
        for (i, request) in requests.iter_mut().enumerate() {
            if request.id.is_empty() {
                request.id = format!("call_{}_{}", turn, i);
            }
        }

        if let Some(usage) = reply.usage {
            state.record_usage(usage);
            info!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                cumulative = state.cumulative_tokens,
                "Model usage"
            );
        }
        debug!(requested = requests.len(), "Model replied");

        state.messages.push(Message::assistant(
            reply.text.unwrap_or_default(),
            requests.clone(),
        ));

        // The run ends here, so requests that will never be dispatched still
        // get a result addressed to them.
        if !requests.is_empty() && self.loop_closed(&state) {
            warn!(
                unanswered = requests.len(),
                cycles = state.dispatch_cycles,
                "Refusing actions requested after the run's limits were reached"
            );
            let status = ActionStatus::BudgetExhausted;
            for request in &requests {
                state.messages.push(Message::action_result(
                    request,
                    status,
                    error_body(status, "no further actions can run in this run"),
                ));
            }
        }
        state.pending_actions = requests;
        Ok(state)
    }

    fn loop_closed(&self, state: &AgentState) -> bool {
        state.budget_exhausted || state.dispatch_cycles >= self.max_dispatch_cycles
    }
}

impl Phase<AgentState> for InvokePhase {
    fn id(&self) -> &str {
        INVOKE
    }

    fn apply(&self, state: AgentState) -> BoxFuture<'_, Result<AgentState>> {
        Box::pin(self.invoke(state))
    }
}

/// Route after a model reply: dispatch pending actions, or stop.
///
/// Stops when nothing is pending, when the dispatch-cycle ceiling is reached,
/// or when a budget refusal was already delivered to the model.
pub fn route_after_invoke(state: &AgentState, max_dispatch_cycles: usize) -> PhaseId {
    if state.pending_actions.is_empty()
        || state.budget_exhausted
        || state.dispatch_cycles >= max_dispatch_cycles
    {
        TERMINATION.to_string()
    } else {
        DISPATCH.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::types::{ModelReply, SessionId, Usage};
    use agentflow_test_utils::{lookup_request, CountingAction, HangingModel, ScriptedModel};
    use serde_json::json;

    fn registry() -> Arc<ActionRegistry> {
        let mut r = ActionRegistry::new();
        r.register(CountingAction::new("lookup", json!({"value": 42})))
            .unwrap();
        r.register(CountingAction::new("search", json!({"hits": 3})))
            .unwrap();
        Arc::new(r)
    }

    fn phase(llm: Arc<dyn ModelClient>, agent: &AgentConfig, model: &ModelConfig) -> InvokePhase {
        InvokePhase::new(llm, registry(), Arc::new(EventBus::default()), agent, model)
    }

    fn state() -> AgentState {
        let mut s = AgentState::new(SessionId::default(), "q", "");
        s.messages.push(Message::user("q"));
        s
    }

    #[tokio::test]
    async fn test_records_reply_and_usage() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::actions(vec![
            lookup_request("c1", 1),
        ])
        .with_usage(Usage {
            input_tokens: 7,
            output_tokens: 3,
        })]));
        let p = phase(model.clone(), &AgentConfig::default(), &ModelConfig::default());
        let out = p.invoke(state()).await.unwrap();
        assert_eq!(out.pending_actions, vec![lookup_request("c1", 1)]);
        assert_eq!(out.messages.last().unwrap().action_requests.len(), 1);
        assert_eq!(out.cumulative_tokens, 10);
        assert_eq!(model.calls()[0].actions.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_request_ids_are_filled() {
        let mut req = lookup_request("", 1);
        req.id.clear();
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::actions(vec![req])]));
        let p = phase(model, &AgentConfig::default(), &ModelConfig::default());
        let out = p.invoke(state()).await.unwrap();
        assert_eq!(out.pending_actions[0].id, "call_1_0");
    }

    #[tokio::test]
    async fn test_tight_budget_prunes_catalog_tail() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let cfg = ModelConfig {
            input_budget_tokens: Some(crate::budget::estimate_payload(
                &state().messages,
                &registry().contracts()[..1],
            )),
            ..Default::default()
        };
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let p = InvokePhase::new(model.clone(), registry(), bus, &AgentConfig::default(), &cfg);
        p.invoke(state()).await.unwrap();

        let sent = &model.calls()[0].actions;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name, "lookup");
        assert!(matches!(
            rx.try_recv(),
            Ok(AgentEvent::CatalogPruned { ref dropped, .. }) if dropped == &vec!["search".to_string()]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout() {
        let agent = AgentConfig {
            model_timeout_secs: Some(5),
            ..Default::default()
        };
        let p = phase(Arc::new(HangingModel), &agent, &ModelConfig::default());
        let err = p.invoke(state()).await.unwrap_err();
        assert!(matches!(err, AgentflowError::ModelTimeout(5)));
    }

    #[tokio::test]
    async fn test_requests_after_cycle_ceiling_are_refused() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::actions(vec![
            lookup_request("c9", 1),
        ])]));
        let agent = AgentConfig {
            max_dispatch_cycles: 2,
            ..Default::default()
        };
        let p = phase(model, &agent, &ModelConfig::default());
        let mut s = state();
        s.dispatch_cycles = 2;
        let out = p.invoke(s).await.unwrap();

        let result = out.messages.last().unwrap();
        assert_eq!(result.action_result_for.as_deref(), Some("c9"));
        assert_eq!(result.status, Some(ActionStatus::BudgetExhausted));
        assert!(!out.converged());
        assert_eq!(route_after_invoke(&out, 2), TERMINATION);
    }

    #[tokio::test]
    async fn test_requests_within_limits_are_left_pending() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::actions(vec![
            lookup_request("c1", 1),
        ])]));
        let p = phase(model, &AgentConfig::default(), &ModelConfig::default());
        let out = p.invoke(state()).await.unwrap();
        assert_eq!(out.action_results().count(), 0);
    }

    #[test]
    fn test_route_after_invoke() {
        let mut s = state();
        assert_eq!(route_after_invoke(&s, 8), TERMINATION);

        s.pending_actions = vec![lookup_request("c1", 1)];
        assert_eq!(route_after_invoke(&s, 8), DISPATCH);

        s.dispatch_cycles = 8;
        assert_eq!(route_after_invoke(&s, 8), TERMINATION);

        s.dispatch_cycles = 1;
        s.budget_exhausted = true;
        assert_eq!(route_after_invoke(&s, 8), TERMINATION);
    }
}
