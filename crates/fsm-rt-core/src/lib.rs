//! Core data model and schema kernel for the FSM orchestration runtime
//! (spec §3, §4.1, §4.2, §4.7 C1/C2/C7's shared types).
//!
//! This crate has no knowledge of subprocesses, capability caches, or the
//! engine loop — those live in `fsm-rt-bridge`, `fsm-rt-cache` and
//! `fsm-rt-engine` respectively, all built on the types defined here.

pub mod action;
pub mod cancel;
pub mod context;
pub mod dynamic_schema;
pub mod error;
pub mod event;
pub mod extensions;
pub mod fsm;
pub mod hats;
pub mod ids;
pub mod registry;
pub mod schema;
pub mod store;

pub use action::{Action, ActionFactory, ActionOutcome, ActionRegistry, PreparedActions};
pub use cancel::CancelToken;
pub use context::RunContext;
pub use dynamic_schema::{resolve_schema, DynamicSchemaFn, DynamicSchemaRegistry};
pub use error::{FsmError, Result};
pub use event::{Event, Trail, TrailEntry};
pub use extensions::Extensions;
pub use fsm::{FsmDefinition, SchemaOrKey, StateDef, XitionDef, XitionId, END, START};
pub use hats::{expand_hats, Hat, HatRegistry};
pub use registry::SchemaRegistry;
pub use schema::{expand, validate, MapEntry, Schema, ValidationError};
pub use store::{parse_fsm_document, FsmStore, FsmSummary, LlmClient, LlmClientRegistry};
