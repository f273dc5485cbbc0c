//! The `llm` action (spec §4.6 C7): sends the owning state's `prompts` to a
//! configured [`fsm_rt_core::store::LlmClient`], parses the reply as an
//! [`Event`], and validates it against the real transition it claims before
//! ever handing it to the engine.
//!
//! This is the "owning LLM state may retry" loop spec §4.5 step 4 refers
//! to: a parse or validation failure here is retried, up to `max_retries`,
//! entirely inside this action. On exhaustion, it takes the state's
//! pre-declared `llm-error` transition if one exists (spec §4.6's retry
//! policy); otherwise it fails the session. Engine-level validation
//! failures (a malformed event arriving by any other path) always stay
//! fatal, per DESIGN.md.

use async_trait::async_trait;
use fsm_rt_core::action::{Action, ActionFactory, ActionOutcome};
use fsm_rt_core::context::RunContext;
use fsm_rt_core::dynamic_schema;
use fsm_rt_core::error::{FsmError, Result};
use fsm_rt_core::event::{Event, Trail};
use fsm_rt_core::fsm::{FsmDefinition, StateDef, XitionDef};
use fsm_rt_core::schema::{self, MapEntry, Schema};
use fsm_rt_core::store::LlmClientRegistry;
use fsm_rt_core::cancel::CancelToken;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

/// The label that marks one of a state's outgoing transitions as the
/// pre-declared error path spec §4.6's retry policy refers to ("emits an
/// `llm-error` event on a pre-declared error transition if the FSM defines
/// one"). Not part of the schema kernel itself — just the convention this
/// action looks for among the transitions it already owns.
const ERROR_TRANSITION_LABEL: &str = "llm-error";

pub struct LlmActionFactory;

impl ActionFactory for LlmActionFactory {
    fn name(&self) -> &str {
        "llm"
    }

    fn config_schema(&self) -> Schema {
        Schema::map(
            false,
            vec![
                MapEntry { key: "service".to_string(), optional: false, schema: Box::new(Schema::String) },
                MapEntry { key: "max_retries".to_string(), optional: true, schema: Box::new(Schema::Int) },
            ],
        )
    }

    fn build(&self, config: &Value, fsm: &FsmDefinition, state: &StateDef) -> Result<Arc<dyn Action>> {
        let parsed: LlmActionConfig = serde_json::from_value(config.clone())
            .map_err(|e| FsmError::Config(format!("state '{}' llm config invalid: {e}", state.id)))?;
        let all_outgoing: Vec<XitionDef> =
            fsm.xitions.iter().filter(|x| x.id.from == state.id).cloned().collect();
        if all_outgoing.is_empty() {
            return Err(FsmError::Config(format!(
                "state '{}' has an `llm` action but no outgoing transitions",
                state.id
            )));
        }
        let error_transition = all_outgoing
            .iter()
            .find(|x| x.label.as_deref() == Some(ERROR_TRANSITION_LABEL))
            .cloned();
        let outgoing: Vec<XitionDef> = all_outgoing
            .into_iter()
            .filter(|x| x.label.as_deref() != Some(ERROR_TRANSITION_LABEL))
            .collect();
        if outgoing.is_empty() {
            return Err(FsmError::Config(format!(
                "state '{}' has an `llm` action but no candidate transitions \
                 (every outgoing edge is the error transition)",
                state.id
            )));
        }
        Ok(Arc::new(LlmAction {
            state_id: state.id.clone(),
            service: parsed.service,
            max_retries: parsed.max_retries.unwrap_or(3),
            prompts: state.prompts.clone(),
            fsm_prompts: fsm.prompts.clone(),
            outgoing,
            error_transition,
        }))
    }
}

#[derive(Deserialize)]
struct LlmActionConfig {
    service: String,
    max_retries: Option<u32>,
}

struct LlmAction {
    state_id: String,
    service: String,
    max_retries: u32,
    prompts: Vec<String>,
    fsm_prompts: Vec<String>,
    outgoing: Vec<XitionDef>,
    error_transition: Option<XitionDef>,
}

impl LlmAction {
    /// Composes the full prompt stack spec §4.6 step 1 describes: FSM-level
    /// prompts, then the destination state's own prompts, then a
    /// machine-readable (emission-optimised) description of the candidate
    /// schema, then a serialised view of the trail so far.
    fn prompt_stack(&self, context: &RunContext, trail: &Trail, schema: &Schema) -> Vec<String> {
        let mut stack = Vec::new();
        stack.extend(self.fsm_prompts.iter().cloned());
        for xition in &self.outgoing {
            stack.extend(xition.prompts.iter().cloned());
        }
        stack.extend(self.prompts.iter().cloned());

        let emission = fsm_rt_emission::emit_schema(schema, &context.schemas);
        if let Ok(schema_json) = serde_json::to_string(&emission.inlined_schema) {
            stack.push(format!("Reply with a value matching this schema: {schema_json}"));
        }
        if let Ok(trail_json) = serde_json::to_string(trail) {
            stack.push(format!("Trail so far: {trail_json}"));
        }
        stack
    }

    /// The schema handed to the LLM client for this attempt: a union of
    /// each outgoing transition's real schema, resolved the same way
    /// [`Self::validate_candidate`] resolves it, so the client is held to
    /// the exact shape a reply is checked against instead of a schema that
    /// only pins `id` and forgets the rest of the payload.
    fn candidate_schema(&self, context: &RunContext) -> Result<Schema> {
        let branches = self
            .outgoing
            .iter()
            .map(|x| dynamic_schema::resolve_schema(&x.schema, context, x))
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema::Union(branches))
    }

    fn retry_prompt(&self, attempt: u32, last_error: &str) -> String {
        format!(
            "Attempt {attempt} did not produce a valid response: {last_error}. \
             Reply again with a JSON object whose \"id\" field is one of the \
             transitions you were offered, matching its required shape exactly."
        )
    }

    /// Looks the candidate event's transition up among this state's
    /// outgoing transitions, resolves its schema, and validates the
    /// payload — exactly the engine's own steps 2-3, run early so a bad
    /// reply never reaches the engine at all.
    fn validate_candidate(&self, context: &RunContext, event: &Event) -> std::result::Result<XitionDef, String> {
        let xition = self
            .outgoing
            .iter()
            .find(|x| x.id == event.id)
            .ok_or_else(|| format!("\"{}\" is not one of this state's transitions", event.id))?
            .clone();
        let schema = dynamic_schema::resolve_schema(&xition.schema, context, &xition)
            .map_err(|e| e.to_string())?;
        schema::validate(&schema, &event.payload_value(), &context.schemas).map_err(|e| e.to_string())?;
        Ok(xition)
    }
}

/// Strips a single Markdown code fence wrapping the reply, if present (spec
/// §4.6 step 5: "strips incidental wrapping"). Leaves anything else as-is —
/// this is only meant to undo the common "```json ... ```" habit, not to
/// parse arbitrary surrounding prose.
fn strip_markdown_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let after_open = after_open.strip_prefix("json").unwrap_or(after_open);
    let after_open = after_open.trim_start_matches(['\n', '\r']);
    match after_open.rfind("```") {
        Some(close) => after_open[..close].trim(),
        None => after_open.trim(),
    }
}

#[async_trait]
impl Action for LlmAction {
    async fn invoke(
        &self,
        context: RunContext,
        _event: Event,
        trail: Trail,
        cancel: CancelToken,
    ) -> Result<ActionOutcome> {
        let client = context
            .extension::<LlmClientRegistry>()
            .and_then(|registry| registry.get(&self.service))
            .ok_or_else(|| FsmError::Config(format!("no such llm service: {}", self.service)))?;

        let span = fsm_rt_observability::spans::llm_invoke(&self.state_id, self.max_retries);
        async move {
            let schema = self.candidate_schema(&context)?;
            let mut prompts = self.prompt_stack(&context, &trail, &schema);
            let mut last_error = String::new();

            for attempt in 0..=self.max_retries {
                if cancel.is_cancelled() {
                    return Err(FsmError::Cancelled);
                }
                if attempt > 0 {
                    prompts.push(self.retry_prompt(attempt, &last_error));
                    tracing::warn!(attempt, last_error = %last_error, "retrying llm action");
                }

                let raw = client.invoke(&prompts, &schema).await?;
                let parsed: Value = match serde_json::from_str(strip_markdown_fence(&raw)) {
                    Ok(v) => v,
                    Err(e) => {
                        last_error = format!("response was not valid structured data: {e}");
                        continue;
                    }
                };
                let event: Event = match serde_json::from_value(parsed) {
                    Ok(e) => e,
                    Err(e) => {
                        last_error = format!("response was not valid structured data: {e}");
                        continue;
                    }
                };
                match self.validate_candidate(&context, &event) {
                    Ok(_xition) => return Ok(ActionOutcome::Next { context, event }),
                    Err(message) => {
                        last_error = message;
                        continue;
                    }
                }
            }

            match &self.error_transition {
                Some(error_xition) => {
                    tracing::warn!(
                        state = %self.state_id,
                        last_error = %last_error,
                        "llm retries exhausted, taking pre-declared error transition"
                    );
                    let mut payload = serde_json::Map::new();
                    payload.insert("error".to_string(), Value::String(last_error));
                    let event = Event::new(error_xition.id.clone(), payload);
                    Ok(ActionOutcome::Next { context, event })
                }
                None => Err(FsmError::LlmRetriesExhausted { attempts: self.max_retries + 1, last_error }),
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsm_rt_core::action::ActionRegistry;
    use fsm_rt_core::error::Result as FsmResult;
    use fsm_rt_core::fsm::{XitionId, END, START};
    use fsm_rt_core::store::LlmClient;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedClient {
        replies: Vec<&'static str>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn invoke(&self, _prompts: &[String], _schema: &Schema) -> FsmResult<String> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(self.replies[i.min(self.replies.len() - 1)].to_string())
        }
    }

    fn fsm_with_llm_state() -> FsmDefinition {
        let state = StateDef::new("ask").with_action("llm").with_config(json!({"service": "stub"}));
        FsmDefinition::new(
            "t",
            vec![state],
            vec![
                XitionDef::new(START, "ask", Schema::Any),
                XitionDef::new("ask", END, Schema::Int),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_first_reply_advances_without_retry() {
        let fsm = fsm_with_llm_state();
        let state = fsm.state("ask").unwrap();
        let action = LlmActionFactory.build(&state.config, &fsm, state).unwrap();
        let client = ScriptedClient { replies: vec![r#"{"id": ["ask", "end"], "n": 1}"#], calls: AtomicU32::new(0) };
        let registry = LlmClientRegistry::builder().register("stub", client).build();
        let context = RunContext::new().with_extension(registry);

        let outcome = action
            .invoke(context, Event::new(XitionId::new(START, "ask"), Default::default()), Trail::new(), CancelToken::new())
            .await
            .unwrap();
        match outcome {
            ActionOutcome::Next { event, .. } => assert_eq!(event.id, XitionId::new("ask", END)),
            ActionOutcome::Complete { .. } => panic!("expected Next, got Complete"),
        }
    }

    #[tokio::test]
    async fn invalid_reply_is_retried_then_succeeds() {
        let fsm = fsm_with_llm_state();
        let state = fsm.state("ask").unwrap();
        let action = LlmActionFactory.build(&state.config, &fsm, state).unwrap();
        let client = ScriptedClient {
            replies: vec![r#"{"id": ["ask", "end"], "n": "not-an-int"}"#, r#"{"id": ["ask", "end"], "n": 7}"#],
            calls: AtomicU32::new(0),
        };
        let registry = LlmClientRegistry::builder().register("stub", client).build();
        let context = RunContext::new().with_extension(registry);

        let outcome = action
            .invoke(context, Event::new(XitionId::new(START, "ask"), Default::default()), Trail::new(), CancelToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::Next { .. }));
    }

    #[tokio::test]
    async fn exhausting_retries_is_fatal() {
        let state = StateDef::new("ask")
            .with_action("llm")
            .with_config(json!({"service": "stub", "max_retries": 1}));
        let fsm = FsmDefinition::new(
            "t",
            vec![state],
            vec![XitionDef::new(START, "ask", Schema::Any), XitionDef::new("ask", END, Schema::Int)],
        )
        .unwrap();
        let state = fsm.state("ask").unwrap();
        let action = LlmActionFactory.build(&state.config, &fsm, state).unwrap();
        let client = ScriptedClient { replies: vec!["not json at all"], calls: AtomicU32::new(0) };
        let registry = LlmClientRegistry::builder().register("stub", client).build();
        let context = RunContext::new().with_extension(registry);

        let err = action
            .invoke(context, Event::new(XitionId::new(START, "ask"), Default::default()), Trail::new(), CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FsmError::LlmRetriesExhausted { .. }));
    }

    #[tokio::test]
    async fn exhausting_retries_takes_the_declared_error_transition_instead_of_failing() {
        let state = StateDef::new("ask")
            .with_action("llm")
            .with_config(json!({"service": "stub", "max_retries": 0}));
        let fsm = FsmDefinition::new(
            "t",
            vec![state],
            vec![
                XitionDef::new(START, "ask", Schema::Any),
                XitionDef::new("ask", END, Schema::Int),
                XitionDef::new("ask", "err", Schema::Any).with_label("llm-error"),
            ],
        )
        .unwrap();
        let state = fsm.state("ask").unwrap();
        let action = LlmActionFactory.build(&state.config, &fsm, state).unwrap();
        let client = ScriptedClient { replies: vec!["not json at all"], calls: AtomicU32::new(0) };
        let registry = LlmClientRegistry::builder().register("stub", client).build();
        let context = RunContext::new().with_extension(registry);

        let outcome = action
            .invoke(context, Event::new(XitionId::new(START, "ask"), Default::default()), Trail::new(), CancelToken::new())
            .await
            .unwrap();
        match outcome {
            ActionOutcome::Next { event, .. } => {
                assert_eq!(event.id, XitionId::new("ask", "err"));
                assert!(event.payload.contains_key("error"));
            }
            ActionOutcome::Complete { .. } => panic!("expected Next, got Complete"),
        }
    }

    #[tokio::test]
    async fn reply_wrapped_in_a_markdown_fence_is_stripped_before_parsing() {
        let fsm = fsm_with_llm_state();
        let state = fsm.state("ask").unwrap();
        let action = LlmActionFactory.build(&state.config, &fsm, state).unwrap();
        let client = ScriptedClient {
            replies: vec!["```json\n{\"id\": [\"ask\", \"end\"], \"n\": 5}\n```"],
            calls: AtomicU32::new(0),
        };
        let registry = LlmClientRegistry::builder().register("stub", client).build();
        let context = RunContext::new().with_extension(registry);

        let outcome = action
            .invoke(context, Event::new(XitionId::new(START, "ask"), Default::default()), Trail::new(), CancelToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::Next { .. }));
    }

    #[test]
    fn builtin_registry_includes_llm() {
        let registry = ActionRegistry::builder().register(LlmActionFactory).build();
        assert!(registry.factory("llm").is_some());
    }
}
