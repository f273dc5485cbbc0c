//! Ambient logging/metrics stack shared by every crate in the workspace.
//!
//! Mirrors the teacher workspace's observability crate's module split
//! (`spans`/`metrics`/`scope`) and its `tracing::instrument` usage, adapted
//! to this workspace's ids (`fsm_rt_core::ids`) in place of the teacher's.
//! Exporting to an external telemetry backend (OpenTelemetry collector,
//! metrics dashboards) is the "telemetry" item spec.md §1 places out of
//! scope; what stays in scope is the in-process `tracing` spans/events and
//! the lightweight in-memory counters below — see DESIGN.md.

pub mod metrics;
pub mod scope;
pub mod spans;
pub mod tracing_setup;

pub use metrics::RunMetrics;
pub use scope::{scope_attributes, scope_summary};
pub use tracing_setup::init_tracing;
