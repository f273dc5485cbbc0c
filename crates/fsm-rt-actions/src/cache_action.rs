//! The `cache` action (spec §4.7 C7, §4.4 C4): drives a bridge's
//! capability cache from claimed-but-nil to fully populated.
//!
//! Per spec §4.4, "`list` is called for each nil capability in turn until
//! every introduced capability is populated; then control passes to the
//! LLM state" — this action *is* that loop. It expects `bridge/start` to
//! have already installed both the bridge and the cache mutex in the
//! context's extensions.

use async_trait::async_trait;
use fsm_rt_bridge::SubprocessBridge;
use fsm_rt_cache::CapabilityCache;
use fsm_rt_core::action::{Action, ActionFactory, ActionOutcome};
use fsm_rt_core::cancel::CancelToken;
use fsm_rt_core::context::RunContext;
use fsm_rt_core::error::{FsmError, Result};
use fsm_rt_core::event::{Event, Trail};
use fsm_rt_core::fsm::{FsmDefinition, StateDef, XitionId};
use fsm_rt_core::schema::{MapEntry, Schema};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Deserialize)]
struct CacheActionConfig {
    next: String,
}

pub struct CacheActionFactory;

impl ActionFactory for CacheActionFactory {
    fn name(&self) -> &str {
        "cache"
    }

    fn config_schema(&self) -> Schema {
        Schema::map(
            false,
            vec![MapEntry { key: "next".to_string(), optional: false, schema: Box::new(Schema::String) }],
        )
    }

    fn build(&self, config: &Value, _fsm: &FsmDefinition, state: &StateDef) -> Result<Arc<dyn Action>> {
        let parsed: CacheActionConfig = serde_json::from_value(config.clone())
            .map_err(|e| FsmError::Config(format!("state '{}' cache config invalid: {e}", state.id)))?;
        Ok(Arc::new(CacheAction { state_id: state.id.clone(), next: parsed.next }))
    }
}

struct CacheAction {
    state_id: String,
    next: String,
}

#[async_trait]
impl Action for CacheAction {
    async fn invoke(
        &self,
        context: RunContext,
        _event: Event,
        _trail: Trail,
        cancel: CancelToken,
    ) -> Result<ActionOutcome> {
        let bridge = context
            .extension::<SubprocessBridge>()
            .ok_or_else(|| FsmError::Cache("cache action requires a bridge already in context".to_string()))?;
        let cache_handle = context
            .extension::<Mutex<CapabilityCache>>()
            .ok_or_else(|| FsmError::Cache("cache action requires a capability cache already in context".to_string()))?;

        loop {
            if cancel.is_cancelled() {
                return Err(FsmError::Cancelled);
            }
            let next_kind = cache_handle.lock().expect("capability cache mutex poisoned").next_nil();
            let Some(kind) = next_kind else { break };

            let result = bridge.call(kind.list_method(), json!({})).await?;
            let entries = CapabilityCache::parse_list_result(kind, &result)?;
            cache_handle.lock().expect("capability cache mutex poisoned").populate(kind, entries)?;
            tracing::debug!(capability = kind.name(), "capability populated");
        }

        Ok(ActionOutcome::Next {
            context,
            event: Event::new(XitionId::new(self.state_id.clone(), self.next.clone()), Default::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsm_rt_core::fsm::{XitionDef, START};

    fn fsm_with_cache_state() -> (FsmDefinition, StateDef) {
        let state = StateDef::new("warm").with_action("cache").with_config(json!({"next": "ready"}));
        let fsm = FsmDefinition::new(
            "t",
            vec![state.clone()],
            vec![XitionDef::new(START, "warm", Schema::Any), XitionDef::new("warm", "ready", Schema::Any)],
        )
        .unwrap();
        (fsm, state)
    }

    #[tokio::test]
    async fn missing_bridge_is_a_config_error() {
        let (fsm, state) = fsm_with_cache_state();
        let action = CacheActionFactory.build(&state.config, &fsm, &state).unwrap();
        let err = action
            .invoke(RunContext::new(), Event::new(XitionId::new(START, "warm"), Default::default()), Trail::new(), CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FsmError::Cache(_)));
    }

    #[tokio::test]
    async fn missing_cache_is_a_config_error_even_with_a_bridge_present() {
        let (fsm, state) = fsm_with_cache_state();
        let action = CacheActionFactory.build(&state.config, &fsm, &state).unwrap();
        let bridge = fsm_rt_bridge::SubprocessBridge::spawn(fsm_rt_bridge::BridgeConfig::new("sh").with_args(["-c", "cat"]))
            .await
            .unwrap();
        let context = RunContext::new().with_extension(bridge);
        let err = action
            .invoke(context, Event::new(XitionId::new(START, "warm"), Default::default()), Trail::new(), CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FsmError::Cache(_)));
    }
}
