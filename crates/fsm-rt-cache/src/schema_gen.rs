//! Dynamic-schema generator (spec §4.4 C5): projects a capability-cache
//! snapshot into the `mcp-request-schema`/`mcp-response-schema` dynamic
//! schema functions referenced by name from transition definitions.
//!
//! Tool `inputSchema` bodies are themselves JSON Schema documents, a
//! different language from this crate's [`Schema`] kernel. Translating one
//! schema language into another is out of scope here (see DESIGN.md); a
//! tool-call's `arguments` are typed `Schema::Any` and left to the LLM
//! client's own prompt-level guidance plus the tool server's own validation.

use crate::cache::{CapabilityCache, CapabilityEntries, CapabilityKind};
use fsm_rt_core::context::RunContext;
use fsm_rt_core::dynamic_schema::DynamicSchemaFn;
use fsm_rt_core::error::{FsmError, Result};
use fsm_rt_core::fsm::XitionDef;
use fsm_rt_core::schema::Schema;
use serde_json::json;
use std::sync::Mutex;

/// The names these functions are registered under in a session's
/// `DynamicSchemaRegistry` (spec §4.4).
pub const MCP_REQUEST_SCHEMA: &str = "mcp-request-schema";
pub const MCP_RESPONSE_SCHEMA: &str = "mcp-response-schema";

/// Standard MCP logging levels (RFC 5424 syslog severities), accepted by
/// `logging/setLevel` (spec §6).
const LOG_LEVELS: [&str; 8] =
    ["debug", "info", "notice", "warning", "error", "critical", "alert", "emergency"];

fn logging_set_level_branch() -> Schema {
    Schema::closed_map(vec![
        Schema::entry("method", false, Schema::Literal(json!("logging/setLevel"))),
        Schema::entry(
            "params",
            false,
            Schema::closed_map(vec![Schema::entry(
                "level",
                false,
                Schema::Enum(LOG_LEVELS.iter().map(|l| json!(l)).collect()),
            )]),
        ),
    ])
}

/// Builds `mcp-request-schema` from a cache snapshot (spec §4.4): one
/// branch per known tool/resource/prompt, plus the standing
/// `logging/setLevel` branch.
pub fn request_schema(cache: &CapabilityCache) -> Schema {
    let mut branches = Vec::new();

    if let Some(CapabilityEntries::Tools(tools)) = cache.get(CapabilityKind::Tools) {
        for tool in tools {
            branches.push(Schema::closed_map(vec![
                Schema::entry("method", false, Schema::Literal(json!("tools/call"))),
                Schema::entry(
                    "params",
                    false,
                    Schema::closed_map(vec![
                        Schema::entry("name", false, Schema::Literal(json!(tool.name))),
                        Schema::entry("arguments", false, Schema::Any),
                    ]),
                ),
            ]));
        }
    }

    if let Some(CapabilityEntries::Resources(resources)) = cache.get(CapabilityKind::Resources) {
        if !resources.is_empty() {
            let uris: Vec<serde_json::Value> = resources.iter().map(|r| json!(r.uri)).collect();
            branches.push(Schema::closed_map(vec![
                Schema::entry("method", false, Schema::Literal(json!("resources/read"))),
                Schema::entry(
                    "params",
                    false,
                    Schema::closed_map(vec![Schema::entry("uri", false, Schema::Enum(uris))]),
                ),
            ]));
        }
    }

    if let Some(CapabilityEntries::Prompts(prompts)) = cache.get(CapabilityKind::Prompts) {
        for prompt in prompts {
            let arg_entries = prompt
                .arguments
                .iter()
                .map(|arg| Schema::entry(arg.name.clone(), !arg.required.unwrap_or(false), Schema::String))
                .collect();
            branches.push(Schema::closed_map(vec![
                Schema::entry("method", false, Schema::Literal(json!("prompts/get"))),
                Schema::entry(
                    "params",
                    false,
                    Schema::closed_map(vec![
                        Schema::entry("name", false, Schema::Literal(json!(prompt.name))),
                        Schema::entry("arguments", true, Schema::closed_map(arg_entries)),
                    ]),
                ),
            ]));
        }
    }

    branches.push(logging_set_level_branch());
    Schema::Union(branches)
}

/// Builds `mcp-response-schema` (spec §4.4): the shape of `result` bodies
/// plus one catch-all notification envelope.
pub fn response_schema(_cache: &CapabilityCache) -> Schema {
    let tool_response = Schema::closed_map(vec![Schema::entry(
        "content",
        false,
        Schema::Vector(Box::new(Schema::Any)),
    )]);
    let resource_response = Schema::closed_map(vec![Schema::entry(
        "contents",
        false,
        Schema::Vector(Box::new(Schema::Any)),
    )]);
    let prompt_response = Schema::closed_map(vec![Schema::entry(
        "messages",
        false,
        Schema::Vector(Box::new(Schema::Any)),
    )]);
    let notification_envelope = Schema::closed_map(vec![
        Schema::entry("method", false, Schema::String),
        Schema::entry("params", true, Schema::Any),
    ]);

    Schema::Union(vec![tool_response, resource_response, prompt_response, notification_envelope])
}

/// `mcp-request-schema` as a [`DynamicSchemaFn`], reading the session's
/// cache from `context.extension::<Mutex<CapabilityCache>>()`.
pub struct McpRequestSchemaFn;

impl DynamicSchemaFn for McpRequestSchemaFn {
    fn resolve(&self, context: &RunContext, _xition: &XitionDef) -> Result<Schema> {
        let cache = cache_handle(context)?;
        let cache = cache.lock().expect("capability cache mutex poisoned");
        Ok(request_schema(&cache))
    }
}

/// `mcp-response-schema` as a [`DynamicSchemaFn`].
pub struct McpResponseSchemaFn;

impl DynamicSchemaFn for McpResponseSchemaFn {
    fn resolve(&self, context: &RunContext, _xition: &XitionDef) -> Result<Schema> {
        let cache = cache_handle(context)?;
        let cache = cache.lock().expect("capability cache mutex poisoned");
        Ok(response_schema(&cache))
    }
}

fn cache_handle(context: &RunContext) -> Result<std::sync::Arc<Mutex<CapabilityCache>>> {
    context
        .extension::<Mutex<CapabilityCache>>()
        .ok_or_else(|| FsmError::Cache("no capability cache registered in context".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{PromptArgument, PromptEntry, ToolEntry};
    use fsm_rt_core::fsm::XitionId;
    use fsm_rt_core::schema::SchemaOrKey;

    fn xition() -> XitionDef {
        XitionDef {
            id: XitionId::new("a", "b"),
            label: None,
            description: None,
            prompts: Vec::new(),
            schema: SchemaOrKey::Dynamic(MCP_REQUEST_SCHEMA.to_string()),
            omit: false,
        }
    }

    #[test]
    fn empty_cache_still_offers_logging_set_level() {
        let cache = CapabilityCache::empty();
        let schema = request_schema(&cache);
        match schema {
            Schema::Union(branches) => assert_eq!(branches.len(), 1),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn populated_tools_and_prompts_each_contribute_a_branch() {
        let mut cache = CapabilityCache::from_claimed([CapabilityKind::Tools, CapabilityKind::Prompts]);
        cache
            .populate(
                CapabilityKind::Tools,
                CapabilityEntries::Tools(vec![ToolEntry {
                    name: "search".into(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                }]),
            )
            .unwrap();
        cache
            .populate(
                CapabilityKind::Prompts,
                CapabilityEntries::Prompts(vec![PromptEntry {
                    name: "summarize".into(),
                    arguments: vec![PromptArgument { name: "topic".into(), required: Some(true) }],
                }]),
            )
            .unwrap();

        match request_schema(&cache) {
            Schema::Union(branches) => assert_eq!(branches.len(), 3), // tool + prompt + logging/setLevel
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn resolve_fails_without_a_cache_in_context() {
        let context = RunContext::new();
        let err = McpRequestSchemaFn.resolve(&context, &xition()).unwrap_err();
        assert!(matches!(err, FsmError::Cache(_)));
    }

    #[test]
    fn resolve_reads_live_cache_state_through_extensions() {
        let context = RunContext::new().with_extension(Mutex::new(CapabilityCache::empty()));
        let schema = McpRequestSchemaFn.resolve(&context, &xition()).unwrap();
        assert!(matches!(schema, Schema::Union(_)));
    }
}
