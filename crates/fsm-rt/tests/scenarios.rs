//! End-to-end scenarios, one per worked example in spec §8.
//!
//! Each scenario drives a real session through [`fsm_rt::start_fsm`] (or,
//! where the scenario is really about the bridge/cache layer rather than
//! the engine loop, the subsystem directly) rather than re-deriving the
//! unit-level behavior already covered inside `fsm-rt-core`,
//! `fsm-rt-bridge`, `fsm-rt-cache` and `fsm-rt-actions`'s own test modules.

use fsm_rt::action::ActionRegistry;
use fsm_rt::bridge::{BridgeConfig, SubprocessBridge};
use fsm_rt::cache::{CapabilityCache, CapabilityKind, watch_list_changed};
use fsm_rt::event::{Event, TrailEntry};
use fsm_rt::fsm::{END, START, XitionId};
use fsm_rt::{EngineConfig, LlmClientRegistry, RunContext, SessionOutcome, start_fsm};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_support::fixtures::{PassthroughFactory, bridge_round_trip_fsm, trivial_two_state_fsm};
use test_support::llm_client::ScriptedClient;
use test_support::mock_server::echo_server_script;

/// S1: the trivial two-state FSM completes with the full two-entry trail.
#[tokio::test]
async fn s1_trivial_two_state_fsm_completes_with_the_expected_trail() {
    let fsm = Arc::new(trivial_two_state_fsm());
    let actions = ActionRegistry::builder()
        .register(PassthroughFactory)
        .register(fsm_rt::actions::end::EndFactory)
        .build();
    let context = RunContext::new().with_actions(actions);
    let handle = start_fsm(fsm, context, EngineConfig::default()).unwrap();

    handle
        .submit(Event::with_payload_value(
            XitionId::new(START, "a"),
            serde_json::json!({"id": [START, "a"], "n": 7}),
        ).unwrap())
        .unwrap();

    let outcome = handle.await_completion().await.unwrap();
    match outcome {
        SessionOutcome::Completed { trail, .. } => {
            assert_eq!(trail.len(), 2);
            let ids: Vec<&XitionId> = trail.iter().filter_map(TrailEntry::transition_id).collect();
            assert_eq!(ids, vec![&XitionId::new(START, "a"), &XitionId::new("a", END)]);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

/// S2: a payload that fails the transition's schema terminates the session
/// with a validation error and an empty trail.
#[tokio::test]
async fn s2_invalid_payload_on_the_first_event_fails_with_an_empty_trail() {
    let fsm = Arc::new(trivial_two_state_fsm());
    let actions = ActionRegistry::builder()
        .register(PassthroughFactory)
        .register(fsm_rt::actions::end::EndFactory)
        .build();
    let context = RunContext::new().with_actions(actions);
    let handle = start_fsm(fsm, context, EngineConfig::default()).unwrap();

    handle
        .submit(Event::with_payload_value(
            XitionId::new(START, "a"),
            serde_json::json!({"id": [START, "a"], "n": "seven"}),
        ).unwrap())
        .unwrap();

    let outcome = handle.await_completion().await.unwrap();
    match outcome {
        SessionOutcome::Failed { trail, error } => {
            assert_eq!(trail.len(), 0);
            assert!(matches!(error, fsm_rt::FsmError::Validation { .. }));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

/// S3: a bridge round trip. The mock tool server is claimed and cached
/// before the LLM ever fires; the scripted model emits a `tools/call` for
/// `add(2, 3)`; the result comes back and the next LLM turn emits `end`.
#[tokio::test]
async fn s3_bridge_round_trip_populates_the_cache_and_completes_via_a_tool_call() {
    let (command, args) = echo_server_script();
    let fsm = Arc::new(bridge_round_trip_fsm(command, args.into_iter().map(str::to_string).collect()));

    let actions = fsm_rt::actions::builtin_actions();
    let client = ScriptedClient::new([
        r#"{"id": ["llm", "service"], "method": "tools/call", "params": {"name": "add", "arguments": {"a": 2, "b": 3}}}"#,
        r#"{"id": ["llm", "end"]}"#,
    ]);
    let llm_clients = LlmClientRegistry::builder().register("stub", client).build();
    let context = RunContext::new().with_actions(actions).with_extension(llm_clients);
    let handle = start_fsm(fsm, context, EngineConfig::default()).unwrap();

    handle.submit(Event::new(XitionId::new(START, "boot"), Default::default())).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(10), handle.await_completion())
        .await
        .expect("session should complete well within the test timeout")
        .unwrap();

    match outcome {
        SessionOutcome::Completed { context, trail } => {
            let cache = context
                .extension::<Mutex<CapabilityCache>>()
                .expect("bridge/start installed a capability cache");
            let cache = cache.lock().unwrap();
            assert!(cache.is_fully_populated(), "tools cache should be populated before the llm ever fires");
            let tools = cache.get(CapabilityKind::Tools).expect("tools entry populated");
            assert_eq!(tools.len(), 2);

            let tool_call_result = trail
                .iter()
                .find_map(|entry| match entry {
                    TrailEntry::Accepted { transition_id, event } if *transition_id == XitionId::new("service", "llm") => {
                        Some(event.payload.get("result").cloned())
                    }
                    _ => None,
                })
                .flatten()
                .expect("the service->llm transition should carry the tool's result");
            assert_eq!(tool_call_result, serde_json::json!({"sum": 5}));
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

/// S4: a `list_changed` notification invalidates exactly the capability it
/// names, and a burst of notifications still only invalidates it once per
/// notification received (not duplicated or dropped).
#[tokio::test]
async fn s4_list_changed_notification_invalidates_the_matching_capability_once() {
    let (command, args) = echo_server_script();
    let bridge = SubprocessBridge::spawn(BridgeConfig::new(command).with_args(args)).await.unwrap();
    let cache = Arc::new(Mutex::new(CapabilityCache::from_claimed([CapabilityKind::Tools])));

    // Populate once before watching for changes, the way `cache`'s loop does.
    let result = bridge.call(CapabilityKind::Tools.list_method(), serde_json::json!({})).await.unwrap();
    let entries = CapabilityCache::parse_list_result(CapabilityKind::Tools, &result).unwrap();
    cache.lock().unwrap().populate(CapabilityKind::Tools, entries).unwrap();
    assert!(cache.lock().unwrap().is_fully_populated());

    let (mut invalidations, _watcher) = watch_list_changed(bridge.clone(), cache.clone());

    bridge.call("debug/trigger_list_changed", serde_json::json!({})).await.unwrap();

    let invalidated = tokio::time::timeout(Duration::from_secs(5), invalidations.recv())
        .await
        .expect("should observe exactly one invalidation")
        .expect("channel should still be open");
    assert_eq!(invalidated, CapabilityKind::Tools);
    assert!(!cache.lock().unwrap().is_fully_populated(), "tools entry should be nil again");

    // Re-populate so a second, distinct notification isn't conflated with a
    // leftover nil state from the first.
    let result = bridge.call(CapabilityKind::Tools.list_method(), serde_json::json!({})).await.unwrap();
    let entries = CapabilityCache::parse_list_result(CapabilityKind::Tools, &result).unwrap();
    cache.lock().unwrap().populate(CapabilityKind::Tools, entries).unwrap();

    bridge.call("debug/trigger_list_changed", serde_json::json!({})).await.unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), invalidations.recv()).await.unwrap().unwrap();
    assert_eq!(second, CapabilityKind::Tools);
    // No further invalidation is pending; the channel would block if polled
    // again, which is exactly what "exactly one refresh per notification"
    // means here.
    assert!(invalidations.try_recv().is_err());

    bridge.stop().await;
}

/// S6: cancelling a session whose action is blocked awaiting a bridge
/// response resolves `await_completion` with `Cancelled` inside the grace
/// window, carrying whatever trail had been recorded so far.
#[tokio::test]
async fn s6_cancel_during_a_slow_action_resolves_cancelled_within_the_grace_window() {
    use async_trait::async_trait;
    use fsm_rt::action::{Action, ActionFactory, ActionOutcome};
    use fsm_rt::cancel::CancelToken;
    use fsm_rt::error::Result;
    use fsm_rt::event::Trail;
    use fsm_rt::fsm::{FsmDefinition, StateDef, XitionDef};
    use fsm_rt::schema::Schema;
    use serde_json::Value;

    struct ForeverFactory;
    struct Forever;

    impl ActionFactory for ForeverFactory {
        fn name(&self) -> &str {
            "forever"
        }
        fn build(&self, _c: &Value, _fsm: &FsmDefinition, _s: &StateDef) -> Result<Arc<dyn Action>> {
            Ok(Arc::new(Forever))
        }
    }

    #[async_trait]
    impl Action for Forever {
        async fn invoke(
            &self,
            context: RunContext,
            _event: Event,
            _trail: Trail,
            cancel: CancelToken,
        ) -> Result<ActionOutcome> {
            tokio::select! {
                _ = cancel.cancelled() => Err(fsm_rt::FsmError::Cancelled),
                _ = tokio::time::sleep(Duration::from_secs(3600)) => Ok(ActionOutcome::Complete { context }),
            }
        }
    }

    let states = vec![StateDef::new("slow").with_action("forever")];
    let xitions = vec![XitionDef::new(START, "slow", Schema::Any)];
    let fsm = Arc::new(FsmDefinition::new("slow-fsm", states, xitions).unwrap());

    let actions = ActionRegistry::builder().register(ForeverFactory).build();
    let context = RunContext::new().with_actions(actions);
    let handle = start_fsm(fsm, context, EngineConfig::default()).unwrap();

    handle.submit(Event::new(XitionId::new(START, "slow"), Default::default())).unwrap();
    // Give the action a moment to actually be in flight before cancelling.
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), handle.await_completion())
        .await
        .expect("cancellation should resolve well inside the grace window")
        .unwrap();
    match outcome {
        SessionOutcome::Cancelled { trail } => {
            assert!(matches!(trail.entries().last(), Some(TrailEntry::Cancelled)));
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
}
