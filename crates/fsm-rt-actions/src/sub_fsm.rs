//! The `sub-fsm` action (spec §4.7 C7): runs a nested [`FsmDefinition`] to
//! completion in-process and folds it into the parent run.
//!
//! "Cross-process FSM migration" is a spec Non-goal; *nested*, in-process
//! sub-FSMs are the Rust-native reading of the same idea, grounded on the
//! teacher's pattern of one runtime owning another (its agent runtime held a
//! nested script bridge the same way). Because this action only ever returns
//! a single outgoing event, the engine records exactly one trail entry for
//! the whole nested run — the child's own trail is never spliced into the
//! parent's; it is simply discarded once the child completes, which is what
//! "folds its final trail into the parent's as a single trail entry" means
//! in a engine that only ever appends one entry per transition crossed.

use async_trait::async_trait;
use fsm_rt_core::action::{Action, ActionFactory, ActionOutcome};
use fsm_rt_core::cancel::CancelToken;
use fsm_rt_core::context::RunContext;
use fsm_rt_core::error::{FsmError, Result};
use fsm_rt_core::event::{Event, Trail};
use fsm_rt_core::fsm::{FsmDefinition, StateDef, XitionId, START};
use fsm_rt_core::schema::{MapEntry, Schema};
use fsm_rt_core::store::{parse_fsm_document, FsmStore};
use fsm_rt_engine::{start_fsm, EngineConfig, SessionOutcome};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Deserialize)]
struct SubFsmConfig {
    fsm_id: String,
    version: Option<u64>,
    #[serde(default)]
    input: Value,
    next: String,
}

pub struct SubFsmFactory;

impl ActionFactory for SubFsmFactory {
    fn name(&self) -> &str {
        "sub-fsm"
    }

    fn config_schema(&self) -> Schema {
        Schema::map(
            false,
            vec![
                MapEntry { key: "fsm_id".to_string(), optional: false, schema: Box::new(Schema::String) },
                MapEntry { key: "version".to_string(), optional: true, schema: Box::new(Schema::Int) },
                MapEntry { key: "input".to_string(), optional: true, schema: Box::new(Schema::Any) },
                MapEntry { key: "next".to_string(), optional: false, schema: Box::new(Schema::String) },
            ],
        )
    }

    fn build(&self, config: &Value, _fsm: &FsmDefinition, state: &StateDef) -> Result<Arc<dyn Action>> {
        let parsed: SubFsmConfig = serde_json::from_value(config.clone())
            .map_err(|e| FsmError::Config(format!("state '{}' sub-fsm config invalid: {e}", state.id)))?;
        Ok(Arc::new(SubFsmAction { state_id: state.id.clone(), config: parsed }))
    }
}

struct SubFsmAction {
    state_id: String,
    config: SubFsmConfig,
}

#[async_trait]
impl Action for SubFsmAction {
    async fn invoke(
        &self,
        context: RunContext,
        _event: Event,
        _trail: Trail,
        cancel: CancelToken,
    ) -> Result<ActionOutcome> {
        let store = context
            .extension::<Arc<dyn FsmStore>>()
            .ok_or_else(|| FsmError::Config("sub-fsm action requires an FsmStore in context".to_string()))?;

        let version = match self.config.version {
            Some(v) => v,
            None => store
                .latest_version(&self.config.fsm_id)
                .await?
                .ok_or_else(|| FsmError::Config(format!("no stored fsm named '{}'", self.config.fsm_id)))?,
        };
        let doc = store
            .load(&self.config.fsm_id, version)
            .await?
            .ok_or_else(|| FsmError::Config(format!("fsm '{}' has no version {}", self.config.fsm_id, version)))?;
        let child_fsm = Arc::new(parse_fsm_document(&doc)?);

        let entry_id = entry_transition(&child_fsm)?;

        // The child gets its own cancel token, tied to the parent's: a
        // cancelled parent run cancels the nested session too, but the
        // nested session completing does not cancel its parent.
        let child_cancel = CancelToken::new();
        let child_context = context.clone().with_cancel(child_cancel);
        let handle = start_fsm(child_fsm, child_context, EngineConfig::default())?;
        let entry_event = Event::with_payload_value(entry_id, self.config.input.clone())
            .map_err(FsmError::Config)?;
        handle.submit(entry_event)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                handle.cancel();
                let _ = handle.await_completion().await;
                Err(FsmError::Cancelled)
            }
            outcome = handle.await_completion() => match outcome? {
                SessionOutcome::Completed { context: child_context, .. } => Ok(ActionOutcome::Next {
                    context: child_context,
                    event: Event::new(XitionId::new(self.state_id.clone(), self.config.next.clone()), Default::default()),
                }),
                SessionOutcome::Failed { error, .. } => Err(error),
                SessionOutcome::Cancelled { .. } => Err(FsmError::Cancelled),
            },
        }
    }
}

/// Finds the child FSM's unique `[start, *]` transition; more than one or
/// none is a config error rather than a guess about which to take.
fn entry_transition(fsm: &FsmDefinition) -> Result<XitionId> {
    let mut entries = fsm.xitions.iter().filter(|x| x.id.from == START);
    let first = entries
        .next()
        .ok_or_else(|| FsmError::Config(format!("nested fsm '{}' has no entry transition from start", fsm.id)))?;
    if entries.next().is_some() {
        return Err(FsmError::Config(format!(
            "nested fsm '{}' has more than one entry transition from start",
            fsm.id
        )));
    }
    Ok(first.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fsm_rt_core::action::{ActionRegistry, ActionOutcome as Outcome};
    use fsm_rt_core::fsm::{XitionDef, END};
    use fsm_rt_core::store::FsmSummary;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct EchoToEnd;

    #[async_trait]
    impl Action for EchoToEnd {
        async fn invoke(
            &self,
            context: RunContext,
            _event: Event,
            _trail: Trail,
            _cancel: CancelToken,
        ) -> Result<Outcome> {
            Ok(Outcome::Complete { context })
        }
    }

    struct EchoToEndFactory;
    impl ActionFactory for EchoToEndFactory {
        fn name(&self) -> &str {
            "echo-to-end"
        }
        fn build(&self, _config: &Value, _fsm: &FsmDefinition, _state: &StateDef) -> Result<Arc<dyn Action>> {
            Ok(Arc::new(EchoToEnd))
        }
    }

    #[derive(Default)]
    struct InMemoryStore {
        docs: Mutex<HashMap<String, Vec<Value>>>,
    }

    #[async_trait]
    impl FsmStore for InMemoryStore {
        async fn latest_version(&self, id: &str) -> Result<Option<u64>> {
            Ok(self.docs.lock().unwrap().get(id).map(|v| v.len() as u64))
        }
        async fn load(&self, id: &str, version: u64) -> Result<Option<Value>> {
            Ok(self.docs.lock().unwrap().get(id).and_then(|v| v.get((version - 1) as usize).cloned()))
        }
        async fn store(&self, id: &str, doc: Value) -> Result<()> {
            self.docs.lock().unwrap().entry(id.to_string()).or_default().push(doc);
            Ok(())
        }
        async fn list(&self) -> Result<Vec<FsmSummary>> {
            Ok(vec![])
        }
    }

    fn child_fsm_doc() -> Value {
        let fsm = FsmDefinition::new(
            "child",
            vec![StateDef::new("greeted").with_action("echo-to-end")],
            vec![XitionDef::new(START, "greeted", Schema::Any), XitionDef::new("greeted", END, Schema::Any)],
        )
        .unwrap();
        serde_json::to_value(&fsm).unwrap()
    }

    #[tokio::test]
    async fn runs_nested_fsm_and_advances_to_next() {
        let store: Arc<dyn FsmStore> = Arc::new(InMemoryStore::default());
        store.store("child", child_fsm_doc()).await.unwrap();

        let state = StateDef::new("delegate")
            .with_action("sub-fsm")
            .with_config(json!({"fsm_id": "child", "next": "done"}));
        let fsm = FsmDefinition::new(
            "parent",
            vec![state.clone()],
            vec![XitionDef::new(START, "delegate", Schema::Any), XitionDef::new("delegate", "done", Schema::Any)],
        )
        .unwrap();

        let action = SubFsmFactory.build(&state.config, &fsm, &state).unwrap();
        let actions = ActionRegistry::builder().register(EchoToEndFactory).build();
        let context = RunContext::new().with_actions(actions).with_extension(store);

        let outcome = action
            .invoke(context, Event::new(XitionId::new(START, "delegate"), Default::default()), Trail::new(), CancelToken::new())
            .await
            .unwrap();
        match outcome {
            Outcome::Next { event, .. } => assert_eq!(event.id, XitionId::new("delegate", "done")),
            Outcome::Complete { .. } => panic!("expected Next"),
        }
    }

    #[test]
    fn entry_transition_requires_exactly_one_start_edge() {
        let fsm = FsmDefinition::new(
            "ambiguous",
            vec![StateDef::new("a").with_action("echo-to-end"), StateDef::new("b").with_action("echo-to-end")],
            vec![XitionDef::new(START, "a", Schema::Any), XitionDef::new(START, "b", Schema::Any)],
        )
        .unwrap();
        assert!(entry_transition(&fsm).is_err());
    }
}
