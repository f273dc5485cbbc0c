//! Runtime scope attribute helpers for tracing spans.
//!
//! Shared utilities for formatting the ids a running session carries
//! (session id, bridge id, context id) into span fields and log lines, so
//! every crate tags its tracing output the same way.

use fsm_rt_core::ids::{BridgeId, ContextId, SessionId};

/// Scope attributes suitable for span fields, mirroring the teacher's
/// `(context_id, message_id, task_id)` triple with this workspace's ids.
pub fn scope_attributes(
    session: Option<&SessionId>,
    bridge: Option<&BridgeId>,
    context: Option<&ContextId>,
) -> (Option<String>, Option<String>, Option<String>) {
    (
        session.map(|id| id.as_str().to_string()),
        bridge.map(|id| id.as_str().to_string()),
        context.map(|id| id.as_str().to_string()),
    )
}

/// Formats scope attributes for a structured log line, showing only the
/// identifiers actually present.
pub fn scope_summary(
    session: Option<&SessionId>,
    bridge: Option<&BridgeId>,
    context: Option<&ContextId>,
) -> String {
    let (session, bridge, context) = scope_attributes(session, bridge, context);
    let mut parts = Vec::new();
    if let Some(id) = session {
        parts.push(format!("session_id={id}"));
    }
    if let Some(id) = bridge {
        parts.push(format!("bridge_id={id}"));
    }
    if let Some(id) = context {
        parts.push(format!("context_id={id}"));
    }
    if parts.is_empty() {
        "no_scope".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scope_reports_no_scope() {
        assert_eq!(scope_summary(None, None, None), "no_scope");
    }

    #[test]
    fn present_ids_are_named_in_order() {
        let session = SessionId::generate();
        let summary = scope_summary(Some(&session), None, None);
        assert!(summary.starts_with("session_id="));
    }
}
