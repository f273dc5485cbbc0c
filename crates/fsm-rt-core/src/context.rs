//! The per-run context (spec §3 "Context").
//!
//! "Process-local mutable mapping carried along the run." Rust's
//! value-semantics make the clearest reading of "actions receive it by
//! value-or-handle and return a new context when they mutate" a plain
//! `Clone` struct of cheaply-shared pieces (`Arc`/persistent registries):
//! an action that wants to "mutate" the context just builds a new
//! `RunContext` from the old one and returns it.

use crate::action::ActionRegistry;
use crate::cancel::CancelToken;
use crate::dynamic_schema::DynamicSchemaRegistry;
use crate::extensions::Extensions;
use crate::registry::SchemaRegistry;
use indexmap::IndexMap;
use serde_json::Value;

/// Process-local, per-session mutable context threaded through every action
/// invocation.
///
/// Recognized keys (spec §3) map onto fields here: `id->action` is
/// [`Self::actions`], `id->schema` is [`Self::dynamic_schemas`], the schema
/// registry is [`Self::schemas`]. The subsystem-scoped keys (`bridge/*`,
/// `cache/state`, `llm/service`, `llm/model`) are not named fields here —
/// `fsm-rt-core` cannot know about `fsm-rt-bridge`'s `SubprocessBridge` type
/// without an upward dependency — they live in [`Self::extensions`], a
/// type-keyed bag downstream crates plug their own handles into (see
/// `extensions.rs` for why). `completion-handle` is not carried in the
/// context at all: only the engine ever needs it, so it stays a field on the
/// session facade instead (documented in DESIGN.md).
#[derive(Clone)]
pub struct RunContext {
    pub actions: ActionRegistry,
    pub dynamic_schemas: DynamicSchemaRegistry,
    pub schemas: SchemaRegistry,
    pub cancel: CancelToken,
    pub extensions: Extensions,
    /// Free-form FSM/action-local data that doesn't warrant its own typed
    /// slot (e.g. accumulators an action keeps across re-entries).
    pub vars: IndexMap<String, Value>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            actions: ActionRegistry::builder().build(),
            dynamic_schemas: DynamicSchemaRegistry::new(),
            schemas: SchemaRegistry::base(),
            cancel: CancelToken::new(),
            extensions: Extensions::new(),
            vars: IndexMap::new(),
        }
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_dynamic_schemas(mut self, dynamic_schemas: DynamicSchemaRegistry) -> Self {
        self.dynamic_schemas = dynamic_schemas;
        self
    }

    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns a new context with `value` installed in the extension bag —
    /// the "return a new context when they mutate" pattern for subsystem
    /// handles.
    pub fn with_extension<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions = self.extensions.with(value);
        self
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<std::sync::Arc<T>> {
        self.extensions.get::<T>()
    }

    pub fn set_var(mut self, key: impl Into<String>, value: Value) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    pub fn var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Handle(u32);

    #[test]
    fn mutation_returns_a_new_context_leaving_the_old_one_intact() {
        let base = RunContext::new();
        let extended = base.clone().with_extension(Handle(5));
        assert!(base.extension::<Handle>().is_none());
        assert_eq!(*extended.extension::<Handle>().unwrap(), Handle(5));
    }

    #[test]
    fn vars_carry_free_form_fsm_local_data() {
        let ctx = RunContext::new().set_var("retries", serde_json::json!(2));
        assert_eq!(ctx.var("retries"), Some(&serde_json::json!(2)));
    }
}
