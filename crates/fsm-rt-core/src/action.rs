//! The action registry (spec §4.7, C7).
//!
//! An action is declared with a name, a configuration schema, a factory
//! `(config, fsm, state) -> invocable`, and the invocable itself. Per spec,
//! "configurations are validated at session start, not at call time, so
//! misconfigurations are caught before any user event is accepted" — that is
//! exactly what [`ActionRegistry::prepare`] does: it walks every state once,
//! validates its config block against the factory's `config_schema`, and
//! builds one ready-to-invoke [`Action`] per state, before the engine loop
//! ever starts.

use crate::context::RunContext;
use crate::error::{FsmError, Result};
use crate::event::{Event, Trail};
use crate::fsm::FsmDefinition;
use crate::registry::SchemaRegistry;
use crate::schema::{self, Schema};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// What an action hands back to the engine once it has produced (at most)
/// one outgoing event, per the FSM invariant "at most one transition is
/// emitted per action invocation" (spec §3).
///
/// This is the direct-return equivalent of the source's
/// `continuation(context, event)` callback: since only one action is ever
/// in flight per session (spec §5), a plain return value carries the same
/// information as a continuation invoked exactly once (spec §9 calls out
/// this kind of control-flow idiom as one to re-architect for the target
/// language).
pub enum ActionOutcome {
    /// Advance: the context for the next iteration, and the event to push
    /// onto the input queue.
    Next { context: RunContext, event: Event },
    /// The destination state was `end`; the action resolved the session's
    /// completion with this final context (spec §4.5 step 9).
    Complete { context: RunContext },
}

/// The invocable body associated with a destination state (glossary
/// "Action").
#[async_trait]
pub trait Action: Send + Sync {
    async fn invoke(
        &self,
        context: RunContext,
        event: Event,
        trail: Trail,
        cancel: crate::cancel::CancelToken,
    ) -> Result<ActionOutcome>;
}

/// A type-checked action factory (spec §4.7).
pub trait ActionFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Validates `config` (the state's config block) before `build` is
    /// called; the default schema is [`Schema::Any`] for actions with no
    /// configuration.
    fn config_schema(&self) -> Schema {
        Schema::Any
    }

    fn build(
        &self,
        config: &Value,
        fsm: &FsmDefinition,
        state: &crate::fsm::StateDef,
    ) -> Result<Arc<dyn Action>>;
}

/// The `id -> action` registry (spec §3 "Context" recognized key).
#[derive(Clone, Default)]
pub struct ActionRegistry {
    factories: Arc<HashMap<String, Arc<dyn ActionFactory>>>,
}

impl ActionRegistry {
    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder { factories: HashMap::new() }
    }

    pub fn factory(&self, name: &str) -> Option<Arc<dyn ActionFactory>> {
        self.factories.get(name).cloned()
    }

    /// Validates every state's action config and builds one [`Action`]
    /// instance per state — the "caught before any user event is accepted"
    /// pass spec §4.7 requires. States with no `action` are skipped (they
    /// are legal only as long as no transition resolves them as a
    /// destination — the engine enforces that at run time with
    /// `no-such-action`).
    pub fn prepare(&self, fsm: &FsmDefinition) -> Result<PreparedActions> {
        let config_registry = SchemaRegistry::base();
        let mut built = HashMap::new();
        for state in &fsm.states {
            let Some(action_name) = &state.action else { continue };
            let factory = self
                .factories
                .get(action_name)
                .ok_or_else(|| FsmError::NoSuchAction(action_name.clone()))?;
            schema::validate(&factory.config_schema(), &state.config, &config_registry).map_err(
                |e| {
                    FsmError::Config(format!(
                        "state '{}' action '{}' config invalid: {e}",
                        state.id, action_name
                    ))
                },
            )?;
            let action = factory.build(&state.config, fsm, state)?;
            built.insert(state.id.clone(), action);
        }
        Ok(PreparedActions { by_state: built })
    }
}

pub struct ActionRegistryBuilder {
    factories: HashMap<String, Arc<dyn ActionFactory>>,
}

impl ActionRegistryBuilder {
    pub fn register(mut self, factory: impl ActionFactory + 'static) -> Self {
        self.factories.insert(factory.name().to_string(), Arc::new(factory));
        self
    }

    pub fn build(self) -> ActionRegistry {
        ActionRegistry { factories: Arc::new(self.factories) }
    }
}

/// The session-start output of [`ActionRegistry::prepare`]: one configured
/// [`Action`] per state, ready for the engine loop to invoke by state id.
#[derive(Clone, Default)]
pub struct PreparedActions {
    by_state: HashMap<String, Arc<dyn Action>>,
}

impl PreparedActions {
    pub fn get(&self, state_id: &str) -> Option<Arc<dyn Action>> {
        self.by_state.get(state_id).cloned()
    }
}
