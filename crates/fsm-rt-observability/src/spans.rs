//! Named span constructors for the crate seams spec §2 calls out as the
//! places that need logging: bridge spawn/stop, engine loop steps, LLM
//! retries, cache refreshes. Centralising the field names here keeps every
//! caller's structured logs queryable by the same keys.

use tracing::Span;

/// One iteration of the engine's main loop (spec §4.5 steps 1-8).
pub fn engine_step(session_id: &str, xition: &str) -> Span {
    tracing::info_span!("fsm.engine.step", session_id, xition)
}

/// Spawning a session's subprocess bridge.
pub fn bridge_spawn(bridge_id: &str, command: &str) -> Span {
    tracing::info_span!("fsm.bridge.spawn", bridge_id, command)
}

/// Stopping a session's subprocess bridge.
pub fn bridge_stop(bridge_id: &str) -> Span {
    tracing::info_span!("fsm.bridge.stop", bridge_id)
}

/// One LLM action invocation, across all of its retries.
pub fn llm_invoke(state: &str, max_retries: u32) -> Span {
    tracing::info_span!("fsm.llm.invoke", state, max_retries)
}

/// One capability-cache refresh request (spec §4.4 tick loop).
pub fn cache_refresh(capability: &str) -> Span {
    tracing::info_span!("fsm.cache.refresh", capability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn engine_step_span_carries_session_and_xition() {
        let span = engine_step("s-1", "[start, a]");
        let _guard = span.enter();
        tracing::info!("stepping");
        assert!(logs_contain("stepping"));
    }
}
