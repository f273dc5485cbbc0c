//! The session facade (spec §6, C8): `startFSM`, `submit`, `cancel`,
//! `awaitCompletion`.
//!
//! Mirrors the bridge's own handle pattern (`fsm-rt-bridge`'s
//! `SubprocessBridge`): a small `Clone`-able struct wrapping bounded
//! channels into a task that owns all the mutable state, so nothing outside
//! this module ever touches the trail or the context directly.

use std::sync::Arc;
use std::sync::Mutex;

use fsm_rt_core::{
    CancelToken, Event, FsmError, FsmDefinition, Result, RunContext, Trail,
};
use fsm_rt_core::ids::SessionId;
use fsm_rt_observability::metrics::RunMetrics;
use tokio::sync::{mpsc, oneshot};

use crate::config::EngineConfig;
use crate::engine::run_session;

/// How a session ended (spec §4.5 step 9, §4.5 "Cancellation", §8 S2).
pub enum SessionOutcome {
    /// The FSM reached `end`; `context` is the final context, `trail` the
    /// full record of every transition crossed.
    Completed { context: RunContext, trail: Trail },
    /// [`SessionHandle::cancel`] was called (or the handle was dropped)
    /// before completion; `trail` holds whatever was recorded up to that
    /// point, with a trailing [`fsm_rt_core::TrailEntry::Cancelled`].
    Cancelled { trail: Trail },
    /// The run ended in an unrecoverable error — a failed transition
    /// lookup, a validation failure, an action's own `Err`, or the input
    /// channel being dropped unexpectedly. `trail` is exactly what had been
    /// recorded at the point of failure (spec §8 S2: "trail length 0" for a
    /// validation failure on the very first event).
    Failed { trail: Trail, error: FsmError },
}

/// A handle onto one running session.
///
/// Cheap to clone: every clone shares the same input queue, cancel token,
/// and completion slot. Only the first caller to poll [`Self::await_completion`]
/// to resolution observes [`SessionOutcome`] — later callers get
/// [`FsmError::SessionGone`], matching the oneshot channel's own
/// single-consumer contract (spec §6 does not ask for a broadcastable
/// completion signal).
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    input_tx: mpsc::Sender<Event>,
    cancel: CancelToken,
    completion_rx: Arc<Mutex<Option<oneshot::Receiver<SessionOutcome>>>>,
    metrics: RunMetrics,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn metrics(&self) -> RunMetrics {
        self.metrics.clone()
    }

    /// Pushes an event onto the session's input queue. Non-blocking: a full
    /// queue fails fast with [`FsmError::QueueFull`] rather than stalling
    /// the caller (spec §5 "All channels are bounded; backpressure
    /// propagates to the caller").
    pub fn submit(&self, event: Event) -> Result<()> {
        self.input_tx.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => FsmError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => FsmError::SessionGone,
        })
    }

    /// Requests cooperative cancellation. Idempotent; safe to call after
    /// the session has already completed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the session to finish, one way or another. Consumes the
    /// completion slot: a second call returns [`FsmError::SessionGone`].
    pub async fn await_completion(&self) -> Result<SessionOutcome> {
        let receiver = self
            .completion_rx
            .lock()
            .expect("completion_rx mutex poisoned")
            .take();
        let receiver = receiver.ok_or(FsmError::SessionGone)?;
        receiver.await.map_err(|_| FsmError::SessionGone)
    }
}

/// Starts a session: validates and prepares every state's action (spec
/// §4.7's "caught before any user event is accepted"), composes the FSM's
/// local schemas on top of whatever the caller already put in `context`,
/// and spawns the engine loop as a background task.
///
/// The returned handle accepts no events of its own accord — per spec §4.5,
/// the first event the caller submits is expected to cross a `[start, *]`
/// transition.
pub fn start_fsm(
    fsm: Arc<FsmDefinition>,
    context: RunContext,
    config: EngineConfig,
) -> Result<SessionHandle> {
    let context = context.clone().with_schemas(context.schemas.with_layer(fsm.schemas.clone()));
    let prepared = context.actions.prepare(&fsm)?;

    let session_id = SessionId::generate();
    let cancel = context.cancel.clone();
    let metrics = RunMetrics::new();

    let (input_tx, input_rx) = mpsc::channel(config.input_queue_capacity.max(1));
    let (completion_tx, completion_rx) = oneshot::channel();

    tokio::spawn(run_session(
        fsm,
        context,
        prepared,
        session_id.clone(),
        input_rx,
        cancel.clone(),
        completion_tx,
        metrics.clone(),
    ));

    Ok(SessionHandle {
        session_id,
        input_tx,
        cancel,
        completion_rx: Arc::new(Mutex::new(Some(completion_rx))),
        metrics,
    })
}


impl std::fmt::Debug for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionOutcome::Completed { trail, .. } => {
                f.debug_struct("Completed").field("trail_len", &trail.len()).finish()
            }
            SessionOutcome::Cancelled { trail } => {
                f.debug_struct("Cancelled").field("trail_len", &trail.len()).finish()
            }
            SessionOutcome::Failed { trail, error } => f
                .debug_struct("Failed")
                .field("trail_len", &trail.len())
                .field("error", error)
                .finish(),
        }
    }
}
