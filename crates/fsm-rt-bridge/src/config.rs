//! Bridge construction config (spec §4.3 `spawn(config)`), in the teacher's
//! builder-struct style (`QuickJSConfig`/`RuntimeConfig`): plain fields,
//! validated at construction, no external config-file loader.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// How long `await_response` waits before resolving `timeout` (spec
    /// §4.3 `await(future, id, timeout)`).
    pub request_timeout: Duration,
    /// How long `stop` waits for the child to exit after stdin is closed
    /// before sending a kill signal (spec §4.3 `stop`).
    pub shutdown_grace: Duration,
}

impl BridgeConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            request_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(2),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}
