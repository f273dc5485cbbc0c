//! Concrete built-in actions (spec §4.7 C7).
//!
//! `fsm-rt-core::action` defines the abstractions (`Action`,
//! `ActionFactory`, `ActionRegistry`); this crate supplies the seven
//! factories every FSM document can name directly: `end`, `llm`,
//! `bridge/start`, `bridge/stop`, `bridge/call`, `cache`, and `sub-fsm`.
//! [`builtin_actions`] registers all of them at once; an embedding
//! application extends or replaces the set by starting from
//! [`fsm_rt_core::ActionRegistry::builder`] itself.

pub mod bridge_actions;
pub mod cache_action;
pub mod end;
pub mod llm;
pub mod sub_fsm;

use fsm_rt_core::ActionRegistry;

/// The seven built-in action factories, pre-registered under their
/// conventional names.
pub fn builtin_actions() -> ActionRegistry {
    ActionRegistry::builder()
        .register(end::EndFactory)
        .register(llm::LlmActionFactory)
        .register(bridge_actions::BridgeStartFactory)
        .register(bridge_actions::BridgeStopFactory)
        .register(bridge_actions::BridgeCallFactory)
        .register(cache_action::CacheActionFactory)
        .register(sub_fsm::SubFsmFactory)
        .build()
}
