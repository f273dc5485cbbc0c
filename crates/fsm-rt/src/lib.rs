//! The FSM orchestration runtime, assembled from its constituent crates
//! (spec §1 OVERVIEW, §9 "embedding" notes).
//!
//! Everything here is a re-export: `fsm-rt-core` supplies the data model
//! and schema kernel, `fsm-rt-engine` the session loop, and the
//! `bridge`/`cache`/`actions`/`emission`/`observability` features bring in
//! the subsystems built on top of them. An embedder who only needs the
//! data model and its own action set (no subprocess bridge, no built-in
//! actions) can depend on this crate with `default-features = false` and
//! pull in only `fsm-rt-core`/`fsm-rt-engine`.
//!
//! This crate's own `tests/` directory is the home of the end-to-end
//! scenarios worked through in spec §8.

pub use fsm_rt_core::*;
pub use fsm_rt_engine::{EngineConfig, SessionHandle, SessionOutcome, start_fsm};

#[cfg(feature = "bridge")]
pub mod bridge {
    pub use fsm_rt_bridge::*;
}

#[cfg(feature = "cache")]
pub mod cache {
    pub use fsm_rt_cache::*;
}

#[cfg(feature = "emission")]
pub mod emission {
    pub use fsm_rt_emission::*;
}

#[cfg(feature = "observability")]
pub mod observability {
    pub use fsm_rt_observability::*;
}

#[cfg(feature = "actions")]
pub mod actions {
    pub use fsm_rt_actions::*;
}
