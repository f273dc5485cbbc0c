//! Shared test fixtures for the FSM runtime's own test suites.
//!
//! A thin layer over `fsm-rt-core`'s own trait boundaries: a trivial
//! in-memory `FsmStore`, a scripted `LlmClient`, a handful of ready-made
//! `FsmDefinition`s, and a fake MCP tool server script for exercising
//! `fsm-rt-bridge` end to end without a real subprocess dependency.

pub mod fixtures;
pub mod llm_client;
pub mod mock_server;
pub mod store;

pub use fixtures::*;
pub use llm_client::ScriptedClient;
pub use mock_server::echo_server_script;
pub use store::InMemoryFsmStore;
