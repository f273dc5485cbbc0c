//! Subprocess bridge: supervises a child process speaking line-delimited
//! JSON-RPC 2.0 over stdio (spec §3 "Bridge", §4.3, §6).

pub mod bridge;
pub mod config;
pub mod error;
pub mod protocol;

pub use bridge::{PendingRequest, SubprocessBridge};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use protocol::{Frame, IncomingFrame, RpcErrorObject, RpcId, RpcRequest};
