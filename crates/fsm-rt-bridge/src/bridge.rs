//! The subprocess bridge itself (spec §4.3, C3).
//!
//! Owns the child process, a writer half of its stdin, and the pending
//! request table; a single reader task is the only thing that ever reads
//! stdout, dispatching each frame to either a pending request's one-shot or
//! the shared notifications channel (spec §5 "Locking discipline": the
//! pending table is touched only by the reader, on completion, and the
//! sender, on insertion).

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::{Frame, IncomingFrame, RpcId, RpcRequest};
use fsm_rt_core::ids::RequestId;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

type PendingTable = Mutex<HashMap<RpcId, oneshot::Sender<std::result::Result<Value, BridgeError>>>>;

/// A future returned by [`SubprocessBridge::send`]; resolve it with
/// [`SubprocessBridge::await_response`].
pub struct PendingRequest {
    id: Option<RpcId>,
    rx: oneshot::Receiver<std::result::Result<Value, BridgeError>>,
}

impl PendingRequest {
    pub fn id(&self) -> Option<&RpcId> {
        self.id.as_ref()
    }
}

struct State {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    pending: PendingTable,
    notifications_tx: broadcast::Sender<Value>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    terminated: AtomicBool,
    config: BridgeConfig,
}

/// Spawned child process + stdin writer + stdout reader + pending-request
/// table + notifications channel + supervisor (spec §3 "Bridge").
#[derive(Clone)]
pub struct SubprocessBridge {
    state: Arc<State>,
}

impl SubprocessBridge {
    /// `spawn(config) -> bridge` (spec §4.3). Fails with `spawn-error` if
    /// the process cannot start.
    #[instrument(skip(config), fields(command = %config.command))]
    pub async fn spawn(config: BridgeConfig) -> Result<Self> {
        let mut command = tokio::process::Command::new(&config.command);
        command
            .args(&config.args)
            .envs(config.env.iter().cloned())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| BridgeError::Spawn(e.to_string()))?;
        let stdin = child.stdin.take().ok_or_else(|| {
            BridgeError::Spawn("child process did not expose a stdin pipe".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            BridgeError::Spawn("child process did not expose a stdout pipe".to_string())
        })?;
        let stderr = child.stderr.take();

        let (notifications_tx, _rx) = broadcast::channel(1024);

        let state = Arc::new(State {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            pending: Mutex::new(HashMap::new()),
            notifications_tx,
            reader_task: Mutex::new(None),
            terminated: AtomicBool::new(false),
            config,
        });

        let reader_state = state.clone();
        let reader = tokio::spawn(async move {
            read_loop(reader_state, stdout).await;
        });
        *state.reader_task.lock().await = Some(reader);

        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "fsm_rt_bridge::stderr", "{line}");
                }
            });
        }

        Ok(Self { state })
    }

    /// `send(bridge, request) -> future` (spec §4.3). A request with `id =
    /// None` is a notification: the write still happens, but the returned
    /// future resolves immediately with no meaningful payload.
    pub async fn send(&self, method: impl Into<String>, params: Value, id: Option<RpcId>) -> Result<PendingRequest> {
        if self.state.terminated.load(Ordering::SeqCst) {
            return Err(BridgeError::Closed);
        }
        let method = method.into();
        match id {
            None => {
                let request = RpcRequest::notification(method, params);
                self.write_line(&request).await?;
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(Ok(Value::Null));
                Ok(PendingRequest { id: None, rx })
            }
            Some(id) => {
                let (tx, rx) = oneshot::channel();
                self.state.pending.lock().await.insert(id.clone(), tx);
                let request = RpcRequest::request(id.clone(), method, params);
                if let Err(e) = self.write_line(&request).await {
                    self.fail_pending(&id, BridgeError::Write(e.to_string())).await;
                    return Err(e);
                }
                Ok(PendingRequest { id: Some(id), rx })
            }
        }
    }

    /// Allocates a fresh request id and sends, in one call — the common
    /// case for callers that don't need to choose the id themselves.
    pub async fn call(&self, method: impl Into<String>, params: Value) -> Result<Value> {
        let id = RpcId::String(RequestId::next().to_string());
        let pending = self.send(method, params, Some(id)).await?;
        self.await_response(pending, self.state.config.request_timeout).await
    }

    /// `await(future, id, timeout) -> response | timeout` (spec §4.3).
    pub async fn await_response(&self, pending: PendingRequest, timeout: Duration) -> Result<Value> {
        let id = pending.id.clone();
        match tokio::time::timeout(timeout, pending.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                if let Some(id) = id {
                    self.state.pending.lock().await.remove(&id);
                }
                Err(BridgeError::Timeout)
            }
        }
    }

    /// `notifications(bridge) -> lazy sequence of incoming messages whose
    /// method starts with "notifications/"` (spec §4.3). The reader loop
    /// already filters to that prefix before broadcasting, so every
    /// message a subscriber receives here qualifies.
    pub fn notifications(&self) -> broadcast::Receiver<Value> {
        self.state.notifications_tx.subscribe()
    }

    /// `stop(bridge)` (spec §4.3): close stdin, drain stdout briefly, kill
    /// the process if it does not exit within the configured grace window.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.state.terminated.store(true, Ordering::SeqCst);

        if let Some(mut stdin) = self.state.stdin.lock().await.take() {
            let _ = stdin.shutdown().await;
        }

        let exited = {
            let mut child_slot = self.state.child.lock().await;
            if let Some(child) = child_slot.as_mut() {
                matches!(
                    tokio::time::timeout(self.state.config.shutdown_grace, child.wait()).await,
                    Ok(Ok(_))
                )
            } else {
                true
            }
        };

        if !exited {
            let mut child_slot = self.state.child.lock().await;
            if let Some(child) = child_slot.as_mut() {
                warn!("child process did not exit within grace window; killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }

        if let Some(reader) = self.state.reader_task.lock().await.take() {
            reader.abort();
        }

        self.fail_all_pending(BridgeError::Closed).await;
    }

    pub fn is_terminated(&self) -> bool {
        self.state.terminated.load(Ordering::SeqCst)
    }

    async fn write_line(&self, request: &RpcRequest) -> Result<()> {
        let mut line = serde_json::to_string(request).map_err(|e| BridgeError::Write(e.to_string()))?;
        line.push('\n');
        let mut stdin_slot = self.state.stdin.lock().await;
        match stdin_slot.as_mut() {
            Some(stdin) => {
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    self.state.terminated.store(true, Ordering::SeqCst);
                    drop(stdin_slot);
                    self.fail_all_pending(BridgeError::Write(e.to_string())).await;
                    return Err(BridgeError::Write(e.to_string()));
                }
                Ok(())
            }
            None => Err(BridgeError::Write("stdin already closed".to_string())),
        }
    }

    async fn fail_pending(&self, id: &RpcId, error: BridgeError) {
        if let Some(tx) = self.state.pending.lock().await.remove(id) {
            let _ = tx.send(Err(error));
        }
    }

    async fn fail_all_pending(&self, error: BridgeError) {
        let mut pending = self.state.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(error.clone()));
        }
    }
}

async fn read_loop(state: Arc<State>, stdout: tokio::process::ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break, // EOF
            Err(e) => {
                warn!("bridge stdout read error: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let frame: IncomingFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("malformed JSON-RPC frame, skipping: {e}");
                continue;
            }
        };
        match frame.classify() {
            Ok(Frame::Response { id, outcome }) => {
                let sender = state.pending.lock().await.remove(&id);
                if let Some(tx) = sender {
                    let _ = tx.send(outcome.map_err(BridgeError::from));
                } else {
                    debug!(%id, "response for unknown/already-resolved request id");
                }
            }
            Ok(Frame::Notification { method, params }) => {
                if crate::protocol::is_notification_method(&method) {
                    let envelope = serde_json::json!({"method": method, "params": params});
                    let _ = state.notifications_tx.send(envelope);
                } else {
                    debug!(method = %method, "ignoring non-notification-prefixed message with no id");
                }
            }
            Err(e) => warn!("malformed JSON-RPC frame, skipping: {e}"),
        }
    }

    state.terminated.store(true, Ordering::SeqCst);
    let mut pending = state.pending.lock().await;
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(BridgeError::Closed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat_config() -> BridgeConfig {
        // A trivial "echo server": reads a line, echoes a canned JSON-RPC
        // response back. Used as a real child process without depending on
        // any particular tool server being installed.
        BridgeConfig::new("sh").with_args([
            "-c",
            r#"while IFS= read -r line; do id=$(printf '%s' "$line" | sed -n 's/.*"id":\([^,}]*\).*/\1/p'); printf '{"jsonrpc":"2.0","id":%s,"result":{"echo":true}}\n' "$id"; done"#,
        ])
    }

    #[tokio::test]
    async fn spawn_send_await_round_trip() {
        let bridge = SubprocessBridge::spawn(cat_config()).await.unwrap();
        let result = bridge.call("ping", Value::Null).await.unwrap();
        assert_eq!(result, serde_json::json!({"echo": true}));
        bridge.stop().await;
    }

    #[tokio::test]
    async fn spawn_error_for_missing_binary() {
        let config = BridgeConfig::new("this-binary-does-not-exist-xyz");
        let err = SubprocessBridge::spawn(config).await.unwrap_err();
        assert!(matches!(err, BridgeError::Spawn(_)));
    }

    #[tokio::test]
    async fn concurrent_sends_correlate_by_id_with_no_cross_talk() {
        let bridge = SubprocessBridge::spawn(cat_config()).await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let bridge = bridge.clone();
            handles.push(tokio::spawn(async move {
                bridge.call("ping", Value::Null).await.unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), serde_json::json!({"echo": true}));
        }
        bridge.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_fails_outstanding_pending() {
        let bridge = SubprocessBridge::spawn(BridgeConfig::new("sleep").with_args(["30"])).await.unwrap();
        let id = RpcId::String("1".to_string());
        let pending = bridge.send("noop", Value::Null, Some(id)).await.unwrap();
        bridge.stop().await;
        let err = bridge.await_response(pending, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Closed));
        bridge.stop().await;
    }
}
