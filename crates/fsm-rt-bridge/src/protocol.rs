//! Line-delimited JSON-RPC 2.0 wire types (spec §6 "Tool-server wire
//! protocol").

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC id: integer or string, unique per bridge lifetime (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcId::Number(n) => write!(f, "{n}"),
            RpcId::String(s) => write!(f, "{s}"),
        }
    }
}

/// An outgoing request or notification. `id: None` makes it a notification
/// — no response is ever expected for it (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RpcId>,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl RpcRequest {
    pub fn request(id: RpcId, method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: "2.0", id: Some(id), method: method.into(), params }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: "2.0", id: None, method: method.into(), params }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Any single incoming line, parsed loosely: a response carries `id` plus
/// exactly one of `result`/`error`; a notification carries `method` and no
/// `id` (spec §6, §4.3 "Protocol details").
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingFrame {
    #[serde(default)]
    pub id: Option<RpcId>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone)]
pub enum Frame {
    Response { id: RpcId, outcome: std::result::Result<Value, RpcErrorObject> },
    Notification { method: String, params: Value },
}

impl IncomingFrame {
    /// Classifies a parsed frame per spec §4.3: "if it carries an `id`
    /// present in the pending table ... otherwise it is a notification."
    /// The `id`-vs-`method` split (not the pending table) is what we can
    /// decide here; the pending-table check happens in the reader loop.
    pub fn classify(self) -> Result<Frame, String> {
        if let Some(id) = self.id {
            let outcome = match (self.result, self.error) {
                (Some(result), None) => Ok(result),
                (None, Some(error)) => Err(error),
                (None, None) => Err(RpcErrorObject {
                    code: -32603,
                    message: "response carries neither result nor error".to_string(),
                    data: None,
                }),
                (Some(_), Some(_)) => {
                    return Err("response carries both result and error".to_string())
                }
            };
            Ok(Frame::Response { id, outcome })
        } else if let Some(method) = self.method {
            Ok(Frame::Notification { method, params: self.params.unwrap_or(Value::Null) })
        } else {
            Err("frame is neither a response (has id) nor a notification (has method)".to_string())
        }
    }
}

pub const NOTIFICATION_PREFIX: &str = "notifications/";

pub fn is_notification_method(method: &str) -> bool {
    method.starts_with(NOTIFICATION_PREFIX)
}
