//! Session construction config, in the workspace's builder-struct style
//! (`BridgeConfig`): plain fields, validated/defaulted at construction, no
//! external config-file loader (spec §1 "Out of scope").

/// Bounds on a session's input queue (spec §5 "All channels are bounded;
/// backpressure propagates to the caller").
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Capacity of the input-event channel. `submit` fails fast with
    /// [`fsm_rt_core::FsmError::QueueFull`] once it is exhausted, rather
    /// than blocking the caller (spec §6: "submit ... non-blocking").
    pub input_queue_capacity: usize,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_queue_capacity(mut self, capacity: usize) -> Self {
        self.input_queue_capacity = capacity;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { input_queue_capacity: 64 }
    }
}
