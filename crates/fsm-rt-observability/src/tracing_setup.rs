//! Process-wide tracing subscriber setup for the `fsm-agent-runner` harness
//! binary. Library crates never install a subscriber themselves — only a
//! binary's `main` should.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs a `fmt` subscriber honoring `RUST_LOG`, defaulting to `info`
/// when unset. Safe to call once at process start; calling it twice panics,
/// matching `tracing`'s own global-subscriber contract.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder().with_env_filter(filter).init();
}
