//! Error types shared across the FSM runtime.
//!
//! Follows the error taxonomy in spec §7: Config, Validation, Protocol,
//! Timeout, Resource, Cancelled. Each downstream crate (`fsm-rt-bridge`,
//! `fsm-rt-cache`, `fsm-rt-engine`, `fsm-rt-actions`) converts its own
//! narrower error type into `FsmError` at its public boundary via `#[from]`,
//! so callers only ever match on one top-level enum.

use thiserror::Error;

/// Top-level error type for the FSM runtime.
#[derive(Error, Debug)]
pub enum FsmError {
    /// The FSM definition, an action's configuration, or a schema definition
    /// was malformed. Surfaced at `startFSM`; always fatal.
    #[error("config error: {0}")]
    Config(String),

    /// An event failed the schema bound to the transition it crossed.
    #[error("transition validation error at {path}: {message}")]
    Validation { path: String, message: String },

    /// No transition with the given id exists in the FSM.
    #[error("no such transition: {0:?}")]
    NoSuchTransition(String),

    /// The destination state named an action not present in the registry.
    #[error("no such action: {0}")]
    NoSuchAction(String),

    /// A schema reference could not be resolved in the active registry.
    #[error("unresolved schema reference: {0}")]
    RefUnresolved(String),

    /// A dynamic schema function was named but not registered.
    #[error("no such dynamic schema function: {0}")]
    NoSuchSchemaFunction(String),

    /// Bridge write failed (stdin closed or OS error).
    #[error("bridge write error: {0}")]
    BridgeWrite(String),

    /// Bridge stdout reached EOF while requests were still pending.
    #[error("bridge closed")]
    BridgeClosed,

    /// Bridge child process failed to start.
    #[error("failed to spawn subprocess: {0}")]
    SpawnError(String),

    /// A JSON-RPC frame could not be parsed.
    #[error("malformed JSON-RPC frame: {0}")]
    MalformedFrame(String),

    /// A JSON-RPC response carried an `error` object.
    #[error("JSON-RPC error {code}: {message}")]
    RpcError { code: i64, message: String },

    /// A capability-cache operation failed: an unrecognised capability name,
    /// or a `*/list` reply that didn't match the shape the capability expects.
    #[error("capability cache error: {0}")]
    Cache(String),

    /// An `await` elapsed before a result arrived. Never fatal by itself.
    #[error("timeout")]
    Timeout,

    /// The LLM action exhausted its retry budget without a valid parse.
    #[error("LLM retries exhausted after {attempts} attempts: {last_error}")]
    LlmRetriesExhausted { attempts: u32, last_error: String },

    /// The session's cancel token was observed; the run stopped cooperatively.
    #[error("cancelled")]
    Cancelled,

    /// `submit` found the session's input queue full; the caller should
    /// back off rather than block the engine loop (spec §5, §6).
    #[error("session input queue is full")]
    QueueFull,

    /// `submit` or `await_completion` was called after the session's loop
    /// had already exited (e.g. a stale handle, or a double `await_completion`).
    #[error("session is no longer running")]
    SessionGone,

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure (spawning, reading/writing a child process, etc).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An action's own invocation logic failed for a reason not covered above.
    #[error("action failed: {0}")]
    ActionFailed(#[source] anyhow::Error),
}

/// Result type alias used throughout the FSM runtime.
pub type Result<T> = std::result::Result<T, FsmError>;
