//! `bridge/start`, `bridge/stop` and `bridge/call` (spec §4.7 C7, §4.3 C3,
//! §4.4 C4).
//!
//! `bridge/start` spawns the subprocess, claims the capabilities named in
//! its config (or every MCP capability kind if none are named), and wires a
//! [`watch_list_changed`] task so a `*/list_changed` notification
//! invalidates the shared cache the instant it arrives — not only the next
//! time something happens to look. `bridge/stop` tears the child down.
//! `bridge/call` is spec §9's "table of tool descriptors and a single
//! generic `call(bridgeId, toolName, args)` dispatcher": it forwards
//! whatever `method`/`params` the `llm` action emitted straight across the
//! session's bridge and hands the raw result to the next state, so no
//! per-tool action ever needs generating.
//!
//! All three are non-branching: spec's built-in actions that don't
//! themselves interpret a model's output always have exactly one outgoing
//! transition, named by `next` in their config, the way a plain waypoint
//! state would be if the FSM format had one.

use async_trait::async_trait;
use fsm_rt_bridge::{BridgeConfig, SubprocessBridge};
use fsm_rt_cache::{watch_list_changed, CapabilityCache, CapabilityKind};
use fsm_rt_core::action::{Action, ActionFactory, ActionOutcome};
use fsm_rt_core::cancel::CancelToken;
use fsm_rt_core::context::RunContext;
use fsm_rt_core::error::{FsmError, Result};
use fsm_rt_core::event::{Event, Trail};
use fsm_rt_core::fsm::{FsmDefinition, StateDef, XitionId};
use fsm_rt_core::schema::{MapEntry, Schema};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// The shared channel a `cache` action (or anything else watching for
/// capability changes) reads from to learn which capability a
/// `list_changed` notification invalidated.
pub type InvalidationReceiver = AsyncMutex<tokio::sync::mpsc::UnboundedReceiver<CapabilityKind>>;

fn config_schema() -> Schema {
    Schema::map(
        false,
        vec![
            MapEntry { key: "command".to_string(), optional: false, schema: Box::new(Schema::String) },
            MapEntry { key: "next".to_string(), optional: false, schema: Box::new(Schema::String) },
        ],
    )
}

#[derive(Deserialize)]
struct BridgeStartConfig {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    /// Capability names to claim (`"tools"`, `"prompts"`, `"resources"`);
    /// empty means claim all three.
    #[serde(default)]
    claim: Vec<String>,
    next: String,
}

pub struct BridgeStartFactory;

impl ActionFactory for BridgeStartFactory {
    fn name(&self) -> &str {
        "bridge/start"
    }

    fn config_schema(&self) -> Schema {
        config_schema()
    }

    fn build(&self, config: &Value, _fsm: &FsmDefinition, state: &StateDef) -> Result<Arc<dyn Action>> {
        let parsed: BridgeStartConfig = serde_json::from_value(config.clone())
            .map_err(|e| FsmError::Config(format!("state '{}' bridge/start config invalid: {e}", state.id)))?;
        Ok(Arc::new(BridgeStartAction { state_id: state.id.clone(), config: parsed }))
    }
}

struct BridgeStartAction {
    state_id: String,
    config: BridgeStartConfig,
}

#[async_trait]
impl Action for BridgeStartAction {
    async fn invoke(
        &self,
        context: RunContext,
        _event: Event,
        _trail: Trail,
        _cancel: CancelToken,
    ) -> Result<ActionOutcome> {
        let mut bridge_config =
            BridgeConfig::new(self.config.command.clone()).with_args(self.config.args.clone());
        for (key, value) in &self.config.env {
            bridge_config = bridge_config.with_env(key.clone(), value.clone());
        }
        let bridge = SubprocessBridge::spawn(bridge_config).await?;

        let claimed: Vec<CapabilityKind> = if self.config.claim.is_empty() {
            CapabilityKind::ALL.to_vec()
        } else {
            self.config.claim.iter().filter_map(|name| CapabilityKind::from_name(name)).collect()
        };
        let cache = CapabilityCache::from_claimed(claimed);

        let context = context.with_extension(bridge.clone()).with_extension(std::sync::Mutex::new(cache));
        let cache_handle = context
            .extension::<std::sync::Mutex<CapabilityCache>>()
            .expect("just inserted above");
        let (invalidations, _watcher_task) = watch_list_changed(bridge, cache_handle);
        let context = context.with_extension(AsyncMutex::new(invalidations));

        Ok(ActionOutcome::Next {
            context,
            event: Event::new(XitionId::new(self.state_id.clone(), self.config.next.clone()), Default::default()),
        })
    }
}

#[derive(Deserialize)]
struct BridgeStopConfig {
    next: String,
}

pub struct BridgeStopFactory;

impl ActionFactory for BridgeStopFactory {
    fn name(&self) -> &str {
        "bridge/stop"
    }

    fn config_schema(&self) -> Schema {
        Schema::map(
            false,
            vec![MapEntry { key: "next".to_string(), optional: false, schema: Box::new(Schema::String) }],
        )
    }

    fn build(&self, config: &Value, _fsm: &FsmDefinition, state: &StateDef) -> Result<Arc<dyn Action>> {
        let parsed: BridgeStopConfig = serde_json::from_value(config.clone())
            .map_err(|e| FsmError::Config(format!("state '{}' bridge/stop config invalid: {e}", state.id)))?;
        Ok(Arc::new(BridgeStopAction { state_id: state.id.clone(), config: parsed }))
    }
}

struct BridgeStopAction {
    state_id: String,
    config: BridgeStopConfig,
}

#[async_trait]
impl Action for BridgeStopAction {
    async fn invoke(
        &self,
        context: RunContext,
        _event: Event,
        _trail: Trail,
        _cancel: CancelToken,
    ) -> Result<ActionOutcome> {
        if let Some(bridge) = context.extension::<SubprocessBridge>() {
            bridge.stop().await;
        }
        Ok(ActionOutcome::Next {
            context,
            event: Event::new(XitionId::new(self.state_id.clone(), self.config.next.clone()), Default::default()),
        })
    }
}

#[derive(Deserialize)]
struct BridgeCallConfig {
    next: String,
}

pub struct BridgeCallFactory;

impl ActionFactory for BridgeCallFactory {
    fn name(&self) -> &str {
        "bridge/call"
    }

    fn config_schema(&self) -> Schema {
        Schema::map(
            false,
            vec![MapEntry { key: "next".to_string(), optional: false, schema: Box::new(Schema::String) }],
        )
    }

    fn build(&self, config: &Value, _fsm: &FsmDefinition, state: &StateDef) -> Result<Arc<dyn Action>> {
        let parsed: BridgeCallConfig = serde_json::from_value(config.clone())
            .map_err(|e| FsmError::Config(format!("state '{}' bridge/call config invalid: {e}", state.id)))?;
        Ok(Arc::new(BridgeCallAction { state_id: state.id.clone(), config: parsed }))
    }
}

struct BridgeCallAction {
    state_id: String,
    config: BridgeCallConfig,
}

#[async_trait]
impl Action for BridgeCallAction {
    /// Reads `method`/`params` off the incoming event's payload (the shape
    /// the `llm` action emits for a tool-call candidate), forwards them
    /// across the bridge via [`SubprocessBridge::call`], and passes the
    /// raw JSON-RPC result on to `next` as `{"result": ...}` — the one
    /// generic dispatcher every tool call goes through, regardless of
    /// which tool it names.
    async fn invoke(
        &self,
        context: RunContext,
        event: Event,
        _trail: Trail,
        _cancel: CancelToken,
    ) -> Result<ActionOutcome> {
        let bridge = context
            .extension::<SubprocessBridge>()
            .ok_or_else(|| FsmError::Config(format!("state '{}': no bridge in context", self.state_id)))?;

        let method = event
            .payload
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| FsmError::Config(format!("state '{}': event is missing \"method\"", self.state_id)))?
            .to_string();
        let params = event.payload.get("params").cloned().unwrap_or(Value::Null);

        let result = bridge.call(&method, params).await?;

        let mut payload = serde_json::Map::new();
        payload.insert("result".to_string(), result);
        Ok(ActionOutcome::Next {
            context,
            event: Event::new(XitionId::new(self.state_id.clone(), self.config.next.clone()), payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bridge_start_spawns_a_real_child_and_advances() {
        let state = StateDef::new("connect").with_action("bridge/start").with_config(serde_json::json!({
            "command": "sh",
            "args": ["-c", "cat"],
            "next": "cached",
        }));
        let fsm = FsmDefinition::new(
            "t",
            vec![state.clone()],
            vec![
                fsm_rt_core::fsm::XitionDef::new(fsm_rt_core::fsm::START, "connect", Schema::Any),
                fsm_rt_core::fsm::XitionDef::new("connect", "cached", Schema::Any),
            ],
        )
        .unwrap();
        let action = BridgeStartFactory.build(&state.config, &fsm, &state).unwrap();
        let outcome = action
            .invoke(RunContext::new(), Event::new(XitionId::new("start", "connect"), Default::default()), Trail::new(), CancelToken::new())
            .await
            .unwrap();
        match outcome {
            ActionOutcome::Next { context, event } => {
                assert_eq!(event.id, XitionId::new("connect", "cached"));
                assert!(context.extension::<SubprocessBridge>().is_some());
                assert!(context.extension::<std::sync::Mutex<CapabilityCache>>().is_some());
            }
            ActionOutcome::Complete { .. } => panic!("expected Next"),
        }
    }

    #[tokio::test]
    async fn bridge_call_forwards_method_and_params_and_returns_the_result() {
        let script = r#"while IFS= read -r line; do id=$(printf '%s' "$line" | sed -n 's/.*"id":\([^,}]*\).*/\1/p'); printf '{"jsonrpc":"2.0","id":%s,"result":{"sum":5}}\n' "$id"; done"#;
        let bridge = SubprocessBridge::spawn(BridgeConfig::new("sh").with_args(["-c", script])).await.unwrap();
        let context = RunContext::new().with_extension(bridge.clone());

        let state = StateDef::new("service").with_action("bridge/call").with_config(serde_json::json!({"next": "end"}));
        let fsm = FsmDefinition::new(
            "t",
            vec![state.clone()],
            vec![
                fsm_rt_core::fsm::XitionDef::new("llm", "service", Schema::Any),
                fsm_rt_core::fsm::XitionDef::new("service", "end", Schema::Any),
            ],
        )
        .unwrap();
        let action = BridgeCallFactory.build(&state.config, &fsm, &state).unwrap();
        let event = Event::new(
            XitionId::new("llm", "service"),
            serde_json::json!({"method": "tools/call", "params": {"name": "add", "arguments": {"a": 2, "b": 3}}})
                .as_object()
                .unwrap()
                .clone(),
        );

        let outcome = action.invoke(context, event, Trail::new(), CancelToken::new()).await.unwrap();
        match outcome {
            ActionOutcome::Next { event, .. } => {
                assert_eq!(event.id, XitionId::new("service", "end"));
                assert_eq!(event.payload.get("result"), Some(&serde_json::json!({"sum": 5})));
            }
            ActionOutcome::Complete { .. } => panic!("expected Next"),
        }
        bridge.stop().await;
    }

    #[tokio::test]
    async fn bridge_call_without_a_bridge_in_context_is_a_config_error() {
        let state = StateDef::new("service").with_action("bridge/call").with_config(serde_json::json!({"next": "end"}));
        let fsm = FsmDefinition::new(
            "t",
            vec![state.clone()],
            vec![
                fsm_rt_core::fsm::XitionDef::new("llm", "service", Schema::Any),
                fsm_rt_core::fsm::XitionDef::new("service", "end", Schema::Any),
            ],
        )
        .unwrap();
        let action = BridgeCallFactory.build(&state.config, &fsm, &state).unwrap();
        let event = Event::new(XitionId::new("llm", "service"), serde_json::json!({"method": "tools/call"}).as_object().unwrap().clone());
        let err = action.invoke(RunContext::new(), event, Trail::new(), CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, FsmError::Config(_)));
    }
}
