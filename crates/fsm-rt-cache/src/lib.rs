//! Capability cache (C4) and dynamic-schema generator (C5): per-session
//! cache of a tool server's advertised tools/prompts/resources, projected
//! into the `mcp-request-schema`/`mcp-response-schema` dynamic schemas
//! (spec §4.4).

pub mod cache;
pub mod schema_gen;
pub mod watcher;

pub use cache::{
    CacheError, CapabilityCache, CapabilityEntries, CapabilityKind, PromptArgument, PromptEntry,
    ResourceEntry, ToolEntry,
};
pub use schema_gen::{
    request_schema, response_schema, McpRequestSchemaFn, McpResponseSchemaFn, MCP_REQUEST_SCHEMA,
    MCP_RESPONSE_SCHEMA,
};
pub use watcher::watch_list_changed;
