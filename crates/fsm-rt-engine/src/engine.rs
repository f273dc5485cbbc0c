//! The engine loop itself (spec §4.5 C6).
//!
//! One session runs on exactly one task; only one action is ever in flight
//! at a time (spec §5 "Concurrency model"). Each iteration dispatches
//! exactly the nine steps spec §4.5 lists: look up the transition, resolve
//! its schema, validate the event, append to the trail, look up the
//! destination state's prepared action, invoke it, and either loop on the
//! action's next event or resolve the session's completion.

use fsm_rt_core::action::{ActionOutcome, PreparedActions};
use fsm_rt_core::error::FsmError;
use fsm_rt_core::event::{Event, Trail, TrailEntry};
use fsm_rt_core::fsm::FsmDefinition;
use fsm_rt_core::ids::SessionId;
use fsm_rt_core::schema::{self, Schema};
use fsm_rt_core::{dynamic_schema, CancelToken, RunContext};
use fsm_rt_observability::metrics::RunMetrics;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use crate::session::SessionOutcome;

/// Drives one session from whatever the caller submits first through to
/// completion or cancellation, then sends exactly one [`SessionOutcome`]
/// down `completion_tx`.
///
/// Runs until either the session resolves or `completion_tx`'s receiver is
/// dropped (in which case the computed outcome is simply discarded — the
/// caller no longer cares).
pub async fn run_session(
    fsm: Arc<FsmDefinition>,
    mut context: RunContext,
    prepared: PreparedActions,
    session_id: SessionId,
    mut input_rx: mpsc::Receiver<Event>,
    cancel: CancelToken,
    completion_tx: oneshot::Sender<SessionOutcome>,
    metrics: RunMetrics,
) {
    let mut trail = Trail::new();
    // The engine's own fast path for "pushes nextEvent onto the input"
    // (spec §4.5 step 8): an action's follow-up event is dispatched before
    // any externally-submitted one, without a channel round-trip.
    let mut queued_internal: Option<Event> = None;

    let outcome = loop {
        let event = match queued_internal.take() {
            Some(event) => event,
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        trail.push(TrailEntry::Cancelled);
                        break SessionOutcome::Cancelled { trail };
                    }
                    received = input_rx.recv() => {
                        match received {
                            Some(event) => event,
                            None => {
                                trail.push(TrailEntry::Cancelled);
                                break SessionOutcome::Cancelled { trail };
                            }
                        }
                    }
                }
            }
        };

        match step(&fsm, &prepared, context, event, trail, &cancel, &metrics, &session_id).await {
            StepResult::Next { context: next_context, event: next_event, trail: next_trail } => {
                context = next_context;
                trail = next_trail;
                queued_internal = Some(next_event);
            }
            StepResult::Completed { context: final_context, trail: final_trail } => {
                break SessionOutcome::Completed { context: final_context, trail: final_trail };
            }
            StepResult::Cancelled { trail: final_trail } => {
                break SessionOutcome::Cancelled { trail: final_trail };
            }
            StepResult::Failed { trail: final_trail, error } => {
                break SessionOutcome::Failed { trail: final_trail, error };
            }
        }
    };

    // The receiving end may already be gone if the caller dropped its
    // handle; that is not this loop's problem to report.
    let _ = completion_tx.send(outcome);
}

enum StepResult {
    Next { context: RunContext, event: Event, trail: Trail },
    Completed { context: RunContext, trail: Trail },
    Cancelled { trail: Trail },
    Failed { trail: Trail, error: FsmError },
}

/// One iteration of the loop above, spec §4.5 steps 1-9, wrapped in its own
/// span so structured logs can be correlated per transition crossed.
async fn step(
    fsm: &Arc<FsmDefinition>,
    prepared: &PreparedActions,
    context: RunContext,
    event: Event,
    mut trail: Trail,
    cancel: &CancelToken,
    metrics: &RunMetrics,
    session_id: &SessionId,
) -> StepResult {
    let xition_label = event.id.to_string();
    let span = fsm_rt_observability::spans::engine_step(session_id.as_str(), &xition_label);
    async move {
        metrics.record_event_accepted();

        // Step 1: look up the transition this event claims to cross.
        let Some(xition) = fsm.transition(&event.id).cloned() else {
            return StepResult::Failed {
                trail,
                error: FsmError::NoSuchTransition(xition_label),
            };
        };

        // Step 2: resolve the schema (inline, or a dynamic schema function
        // evaluated against the live context).
        let schema = match dynamic_schema::resolve_schema(&xition.schema, &context, &xition) {
            Ok(schema) => schema,
            Err(error) => return StepResult::Failed { trail, error },
        };

        // Step 3: validate. A failure here is always fatal to the session:
        // the LLM action's own pre-validation loop (spec §4.6) is what
        // retries malformed model output before it ever reaches this
        // point, so anything that still fails here is a contract violation
        // the engine cannot repair on the caller's behalf.
        if let Err(validation_error) = validate_event(&schema, &event, &context) {
            metrics.record_validation_failure();
            tracing::warn!(error = %validation_error, "event failed transition validation");
            return StepResult::Failed { trail, error: validation_error };
        }

        // Step 4/5: append to the trail, honoring `omit`.
        if xition.omit {
            trail.push(TrailEntry::Omitted { transition_id: xition.id.clone() });
        } else {
            trail.push(TrailEntry::Accepted { transition_id: xition.id.clone(), event: event.clone() });
        }

        // Step 6/7: look up and invoke the destination state's prepared
        // action, unless the destination is the reserved `end` state and no
        // state was declared to own it — then the session simply completes.
        let destination = xition.id.to.clone();
        let invocation = match prepared.get(&destination) {
            Some(action) => {
                action.invoke(context.clone(), event, trail.clone(), cancel.clone()).await
            }
            None if destination == fsm_rt_core::fsm::END => {
                return StepResult::Completed { context, trail };
            }
            None => return StepResult::Failed { trail, error: FsmError::NoSuchAction(destination) },
        };

        // Step 8/9: advance on `Next`, resolve on `Complete`.
        match invocation {
            Ok(ActionOutcome::Next { context: next_context, event: next_event }) => {
                StepResult::Next { context: next_context, event: next_event, trail }
            }
            Ok(ActionOutcome::Complete { context: final_context }) => {
                StepResult::Completed { context: final_context, trail }
            }
            Err(FsmError::Cancelled) => {
                trail.push(TrailEntry::Cancelled);
                StepResult::Cancelled { trail }
            }
            Err(error) => StepResult::Failed { trail, error },
        }
    }
    .instrument(span)
    .await
}

fn validate_event(schema: &Schema, event: &Event, context: &RunContext) -> Result<(), FsmError> {
    schema::validate(schema, &event.payload_value(), &context.schemas)
}
