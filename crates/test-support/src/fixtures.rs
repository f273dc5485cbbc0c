//! Ready-made FSM definitions and a trivial `passthrough` action, covering
//! the literal worked examples in spec §8 so the crate's own integration
//! tests don't each re-derive them.

use async_trait::async_trait;
use fsm_rt_core::action::{Action, ActionFactory, ActionOutcome};
use fsm_rt_core::cancel::CancelToken;
use fsm_rt_core::context::RunContext;
use fsm_rt_core::error::{FsmError, Result};
use fsm_rt_core::event::{Event, Trail};
use fsm_rt_core::fsm::{FsmDefinition, StateDef, XitionDef, XitionId, END, START};
use fsm_rt_core::schema::Schema;
use serde_json::Value;
use std::sync::Arc;

/// A no-op action that forwards the event it receives onto its state's one
/// outgoing transition unchanged — spec §8 S1's `passthrough`.
pub struct PassthroughFactory;

impl ActionFactory for PassthroughFactory {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn build(&self, _config: &Value, fsm: &FsmDefinition, state: &StateDef) -> Result<Arc<dyn Action>> {
        let outgoing: Vec<XitionId> =
            fsm.xitions.iter().filter(|x| x.id.from == state.id).map(|x| x.id.clone()).collect();
        let [only] = <[XitionId; 1]>::try_from(outgoing).map_err(|found| {
            FsmError::Config(format!(
                "state '{}' has a `passthrough` action but {} outgoing transitions (needs exactly 1)",
                state.id,
                found.len()
            ))
        })?;
        Ok(Arc::new(PassthroughAction { next: only }))
    }
}

struct PassthroughAction {
    next: XitionId,
}

#[async_trait]
impl Action for PassthroughAction {
    async fn invoke(&self, context: RunContext, event: Event, _trail: Trail, _cancel: CancelToken) -> Result<ActionOutcome> {
        Ok(ActionOutcome::Next { context, event: Event::new(self.next.clone(), event.payload) })
    }
}

fn const_id_and_int_schema(id: XitionId) -> Schema {
    Schema::map(
        false,
        vec![
            Schema::entry("id", false, Schema::Literal(serde_json::to_value(&id).unwrap())),
            Schema::entry("n", false, Schema::Int),
        ],
    )
}

/// Spec §8 S1: `[{id:"a", action:"passthrough"}, {id:"end", action:"end"}]`
/// with `[start,a]` and `[a,end]` each schema'd `{id:const[...], n:int}`.
pub fn trivial_two_state_fsm() -> FsmDefinition {
    FsmDefinition::new(
        "trivial-two-state",
        vec![StateDef::new("a").with_action("passthrough"), StateDef::new(END).with_action("end")],
        vec![
            XitionDef::new(START, "a", const_id_and_int_schema(XitionId::new(START, "a"))),
            XitionDef::new("a", END, const_id_and_int_schema(XitionId::new("a", END))),
        ],
    )
    .expect("fixture FSM satisfies its own invariants")
}

/// Spec §8 S3/S4: `start -> boot(bridge/start) -> cache -> llm -> service(bridge/call) -> llm -> end`.
/// The `llm` state is visited twice: once to emit a tool-call candidate,
/// once more (after `bridge/call` returns the tool's result) to emit `end`.
/// `command`/`args` spawn the mock tool server that should back `boot`.
pub fn bridge_round_trip_fsm(command: impl Into<String>, args: Vec<String>) -> FsmDefinition {
    let boot = StateDef::new("boot").with_action("bridge/start").with_config(serde_json::json!({
        "command": command.into(),
        "args": args,
        "claim": ["tools"],
        "next": "cache",
    }));
    let cache = StateDef::new("cache").with_action("cache").with_config(serde_json::json!({"next": "llm"}));
    let llm = StateDef::new("llm").with_action("llm").with_config(serde_json::json!({"service": "stub"}));
    let service = StateDef::new("service").with_action("bridge/call").with_config(serde_json::json!({"next": "llm"}));
    let end = StateDef::new(END).with_action("end");

    FsmDefinition::new(
        "bridge-round-trip",
        vec![boot, cache, llm, service, end],
        vec![
            XitionDef::new(START, "boot", Schema::Any),
            XitionDef::new("boot", "cache", Schema::Any),
            XitionDef::new("cache", "llm", Schema::Any),
            XitionDef::new("llm", "service", Schema::Any),
            XitionDef::new("service", "llm", Schema::Any),
            XitionDef::new("llm", END, Schema::Any),
        ],
    )
    .expect("fixture FSM satisfies its own invariants")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_two_state_fsm_matches_the_documented_shape() {
        let fsm = trivial_two_state_fsm();
        assert!(fsm.state("a").is_some());
        assert!(fsm.transition(&XitionId::new(START, "a")).is_some());
        assert!(fsm.transition(&XitionId::new("a", END)).is_some());
    }

    #[test]
    fn bridge_round_trip_fsm_has_the_five_wired_states() {
        let fsm = bridge_round_trip_fsm("sh", vec!["-c".to_string(), "cat".to_string()]);
        for id in ["boot", "cache", "llm", "service", "end"] {
            assert!(fsm.state(id).is_some(), "missing state {id}");
        }
    }
}
