//! Strongly-typed id wrappers for domain concepts.
//!
//! These newtypes prevent mixing different id kinds at compile time. Each
//! carries the construction token from `fsm-rt-id` that documents how it is
//! legally produced.

pub use fsm_rt_id::{
    ConstantConstructible, ConstantId, DerivedConstructible, DerivedId, ExternalConstructible,
    ExternalId, MonotonicConstructible, MonotonicId, TemporalConstructible, TemporalId,
    UuidConstructible, UuidId,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

macro_rules! define_id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id_type!(
    /// Identifies one session (one run of an FSM from `start` to completion).
    SessionId
);
define_id_type!(
    /// Correlates a JSON-RPC request with its eventual response across a bridge.
    RequestId
);
define_id_type!(
    /// Identifies one subprocess bridge instance.
    BridgeId
);
define_id_type!(
    /// Identifies one execution context/trace scope.
    ContextId
);

impl SessionId {
    pub fn generate() -> Self {
        Self(UuidId::generate().to_string())
    }
}
impl UuidConstructible for SessionId {}

impl BridgeId {
    pub fn generate() -> Self {
        Self(UuidId::generate().to_string())
    }
}
impl UuidConstructible for BridgeId {}

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    /// Allocates the next request id for a bridge. Request ids are never
    /// reused within a bridge's lifetime (spec §4.3).
    pub fn next() -> Self {
        let n = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(n.to_string())
    }
}
impl MonotonicConstructible for RequestId {}

static CONTEXT_COUNTER: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    pub fn new(millis: u64, counter: u64) -> Self {
        Self(TemporalId::new("ctx", millis, counter).into_string())
    }

    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let counter = CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::new(millis, counter)
    }
}
impl TemporalConstructible for ContextId {}
