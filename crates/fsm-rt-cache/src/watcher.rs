//! Bridges a [`SubprocessBridge`]'s notification stream into capability
//! invalidation (spec §4.4: "On a `notifications/{capability}/list_changed`
//! message, the matching entry is set back to nil and the cache state is
//! re-entered").
//!
//! The watcher only owns the cache mutation; re-entering the FSM's `cache`
//! state is the engine's job (it owns the event queue), which is why this
//! emits a [`CapabilityKind`] over a channel rather than calling back into
//! the engine directly.

use crate::cache::{CapabilityCache, CapabilityKind};
use fsm_rt_bridge::SubprocessBridge;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawns a task that watches `bridge`'s notification stream, invalidates
/// the matching entry in `cache` on every `*/list_changed`, and forwards
/// the invalidated [`CapabilityKind`] on the returned channel so a caller
/// (the engine) can re-enter the `cache` state exactly once per burst.
pub fn watch_list_changed(
    bridge: SubprocessBridge,
    cache: Arc<Mutex<CapabilityCache>>,
) -> (mpsc::UnboundedReceiver<CapabilityKind>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut notifications = bridge.notifications();
    let handle = tokio::spawn(async move {
        loop {
            let message = match notifications.recv().await {
                Ok(message) => message,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification receiver lagged; some list_changed events may be missed");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            let Some(method) = message.get("method").and_then(|m| m.as_str()) else {
                continue;
            };
            let Some(capability) = parse_list_changed(method) else {
                continue;
            };
            {
                let mut cache = cache.lock().expect("capability cache mutex poisoned");
                cache.invalidate(capability);
            }
            debug!(capability = capability.name(), "capability invalidated by list_changed");
            if tx.send(capability).is_err() {
                break; // receiver dropped, nothing left to notify
            }
        }
    });
    (rx, handle)
}

fn parse_list_changed(method: &str) -> Option<CapabilityKind> {
    let name = method.strip_prefix("notifications/")?.strip_suffix("/list_changed")?;
    CapabilityKind::from_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_capability_notifications() {
        assert_eq!(parse_list_changed("notifications/tools/list_changed"), Some(CapabilityKind::Tools));
        assert_eq!(parse_list_changed("notifications/prompts/list_changed"), Some(CapabilityKind::Prompts));
        assert_eq!(parse_list_changed("notifications/resources/list_changed"), Some(CapabilityKind::Resources));
    }

    #[test]
    fn ignores_unrelated_notifications() {
        assert_eq!(parse_list_changed("notifications/message"), None);
        assert_eq!(parse_list_changed("notifications/cancelled"), None);
        assert_eq!(parse_list_changed("notifications/tools/called"), None);
    }
}
