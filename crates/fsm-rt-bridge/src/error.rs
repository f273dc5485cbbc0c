//! Structured bridge errors (spec §7 "Protocol", "Resource", "Timeout").

use crate::protocol::RpcErrorObject;
use fsm_rt_core::FsmError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BridgeError {
    #[error("failed to spawn subprocess: {0}")]
    Spawn(String),

    #[error("bridge write error: {0}")]
    Write(String),

    /// Stdout reached EOF, or the reader loop ended, while requests were
    /// still pending.
    #[error("bridge closed")]
    Closed,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("malformed JSON-RPC frame: {0}")]
    MalformedFrame(String),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl From<RpcErrorObject> for BridgeError {
    fn from(e: RpcErrorObject) -> Self {
        BridgeError::Rpc { code: e.code, message: e.message }
    }
}

impl From<BridgeError> for FsmError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Spawn(msg) => FsmError::SpawnError(msg),
            BridgeError::Write(msg) => FsmError::BridgeWrite(msg),
            BridgeError::Closed => FsmError::BridgeClosed,
            BridgeError::Timeout => FsmError::Timeout,
            BridgeError::MalformedFrame(msg) => FsmError::MalformedFrame(msg),
            BridgeError::Rpc { code, message } => FsmError::RpcError { code, message },
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
