//! The `end` action (spec §4.7): a state whose sole job is to resolve the
//! session's completion. Declaring it explicitly (rather than always
//! relying on the engine's implicit "no action for the reserved `end`
//! state" fallback) lets an FSM author attach `prompts`/`hats` to a named
//! completion state, or reuse the same state id across more than one
//! incoming transition.

use async_trait::async_trait;
use fsm_rt_core::action::{Action, ActionFactory, ActionOutcome};
use fsm_rt_core::context::RunContext;
use fsm_rt_core::error::Result;
use fsm_rt_core::event::{Event, Trail};
use fsm_rt_core::fsm::{FsmDefinition, StateDef};
use fsm_rt_core::{cancel::CancelToken, schema::Schema};
use serde_json::Value;
use std::sync::Arc;

pub struct EndFactory;

impl ActionFactory for EndFactory {
    fn name(&self) -> &str {
        "end"
    }

    fn config_schema(&self) -> Schema {
        Schema::Any
    }

    fn build(&self, _config: &Value, _fsm: &FsmDefinition, _state: &StateDef) -> Result<Arc<dyn Action>> {
        Ok(Arc::new(EndAction))
    }
}

struct EndAction;

#[async_trait]
impl Action for EndAction {
    async fn invoke(
        &self,
        context: RunContext,
        _event: Event,
        _trail: Trail,
        _cancel: CancelToken,
    ) -> Result<ActionOutcome> {
        Ok(ActionOutcome::Complete { context })
    }
}
