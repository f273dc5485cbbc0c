//! Per-session capability cache (spec §3 "Capability cache", §4.4 C4).
//!
//! A capability is `nil` (claimed by the server, not yet listed) or
//! populated with a list of entries. The only legal transitions are
//! nil → populated (a successful `*/list` reply) and populated → nil (a
//! `*/list_changed` notification); there is no "unclaimed" state once a
//! capability has been introduced.

use fsm_rt_core::FsmError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tools,
    Prompts,
    Resources,
}

impl CapabilityKind {
    /// The MCP capability name as it appears in `initialize`'s capabilities
    /// map and in `notifications/{name}/list_changed`.
    pub fn name(self) -> &'static str {
        match self {
            CapabilityKind::Tools => "tools",
            CapabilityKind::Prompts => "prompts",
            CapabilityKind::Resources => "resources",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tools" => Some(CapabilityKind::Tools),
            "prompts" => Some(CapabilityKind::Prompts),
            "resources" => Some(CapabilityKind::Resources),
            _ => None,
        }
    }

    /// The method used to (re)populate this capability (spec §6).
    pub fn list_method(self) -> &'static str {
        match self {
            CapabilityKind::Tools => "tools/list",
            CapabilityKind::Prompts => "prompts/list",
            CapabilityKind::Resources => "resources/list",
        }
    }

    pub fn list_changed_method(self) -> String {
        format!("notifications/{}/list_changed", self.name())
    }

    pub const ALL: [CapabilityKind; 3] =
        [CapabilityKind::Tools, CapabilityKind::Prompts, CapabilityKind::Resources];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub uri: String,
    pub name: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub required: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptEntry {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityEntries {
    Tools(Vec<ToolEntry>),
    Prompts(Vec<PromptEntry>),
    Resources(Vec<ResourceEntry>),
}

impl CapabilityEntries {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            CapabilityEntries::Tools(_) => CapabilityKind::Tools,
            CapabilityEntries::Prompts(_) => CapabilityKind::Prompts,
            CapabilityEntries::Resources(_) => CapabilityKind::Resources,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CapabilityEntries::Tools(v) => v.len(),
            CapabilityEntries::Prompts(v) => v.len(),
            CapabilityEntries::Resources(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("capability {0:?} was never introduced by initialize")]
    NotIntroduced(CapabilityKind),

    #[error("malformed {method} reply: {message}")]
    MalformedListReply { method: &'static str, message: String },
}

impl From<CacheError> for FsmError {
    fn from(e: CacheError) -> Self {
        FsmError::Cache(e.to_string())
    }
}

/// `nil` until a successful `list`, populated after, `nil` again on a
/// `list_changed` notification (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct CapabilityCache {
    entries: HashMap<CapabilityKind, Option<CapabilityEntries>>,
}

impl CapabilityCache {
    pub fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Introduces every claimed capability as a nil entry (spec §4.4: "On
    /// `initialize` response, capabilities the server claims to support
    /// ... are introduced as nil entries").
    pub fn from_claimed(claimed: impl IntoIterator<Item = CapabilityKind>) -> Self {
        let mut entries = HashMap::new();
        for kind in claimed {
            entries.insert(kind, None);
        }
        Self { entries }
    }

    pub fn is_introduced(&self, kind: CapabilityKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// `Some(entries)` once populated; `None` if nil or never introduced.
    pub fn get(&self, kind: CapabilityKind) -> Option<&CapabilityEntries> {
        self.entries.get(&kind).and_then(|slot| slot.as_ref())
    }

    /// The first introduced capability still awaiting a `list` reply, in a
    /// fixed order, so the tick loop's work is deterministic.
    pub fn next_nil(&self) -> Option<CapabilityKind> {
        CapabilityKind::ALL
            .into_iter()
            .find(|kind| matches!(self.entries.get(kind), Some(None)))
    }

    /// True once every introduced capability has a populated entry (spec
    /// §4.4: "until every introduced capability is populated; then control
    /// passes to the LLM state").
    pub fn is_fully_populated(&self) -> bool {
        self.entries.values().all(|slot| slot.is_some())
    }

    pub fn populate(&mut self, kind: CapabilityKind, entries: CapabilityEntries) -> Result<(), CacheError> {
        if !self.entries.contains_key(&kind) {
            return Err(CacheError::NotIntroduced(kind));
        }
        self.entries.insert(kind, Some(entries));
        Ok(())
    }

    /// Resets a capability back to nil (spec §4.4: a `list_changed`
    /// notification "sets the matching entry back to nil").
    pub fn invalidate(&mut self, kind: CapabilityKind) {
        if self.entries.contains_key(&kind) {
            self.entries.insert(kind, None);
        }
    }

    pub fn introduced(&self) -> impl Iterator<Item = CapabilityKind> + '_ {
        self.entries.keys().copied()
    }

    /// Parses a `{capability}/list` JSON-RPC result body into entries.
    pub fn parse_list_result(kind: CapabilityKind, result: &Value) -> Result<CapabilityEntries, CacheError> {
        let method = kind.list_method();
        let array = result
            .get(kind.name())
            .ok_or_else(|| CacheError::MalformedListReply {
                method,
                message: format!("missing \"{}\" array", kind.name()),
            })?;
        match kind {
            CapabilityKind::Tools => {
                let tools: Vec<ToolEntry> = serde_json::from_value(array.clone())
                    .map_err(|e| CacheError::MalformedListReply { method, message: e.to_string() })?;
                Ok(CapabilityEntries::Tools(tools))
            }
            CapabilityKind::Prompts => {
                let prompts: Vec<PromptEntry> = serde_json::from_value(array.clone())
                    .map_err(|e| CacheError::MalformedListReply { method, message: e.to_string() })?;
                Ok(CapabilityEntries::Prompts(prompts))
            }
            CapabilityKind::Resources => {
                let resources: Vec<ResourceEntry> = serde_json::from_value(array.clone())
                    .map_err(|e| CacheError::MalformedListReply { method, message: e.to_string() })?;
                Ok(CapabilityEntries::Resources(resources))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn freshly_claimed_capabilities_start_nil() {
        let cache = CapabilityCache::from_claimed([CapabilityKind::Tools, CapabilityKind::Prompts]);
        assert!(!cache.is_fully_populated());
        assert_eq!(cache.next_nil(), Some(CapabilityKind::Tools));
        assert!(cache.get(CapabilityKind::Tools).is_none());
        assert!(cache.get(CapabilityKind::Resources).is_none());
        assert!(!cache.is_introduced(CapabilityKind::Resources));
    }

    #[test]
    fn populate_then_invalidate_round_trips() {
        let mut cache = CapabilityCache::from_claimed([CapabilityKind::Tools]);
        let entries = CapabilityEntries::Tools(vec![ToolEntry {
            name: "search".into(),
            description: None,
            input_schema: json!({"type": "object"}),
        }]);
        cache.populate(CapabilityKind::Tools, entries.clone()).unwrap();
        assert!(cache.is_fully_populated());
        assert_eq!(cache.get(CapabilityKind::Tools), Some(&entries));

        cache.invalidate(CapabilityKind::Tools);
        assert!(!cache.is_fully_populated());
        assert_eq!(cache.next_nil(), Some(CapabilityKind::Tools));
    }

    #[test]
    fn populating_an_uncommitted_capability_is_an_error() {
        let mut cache = CapabilityCache::empty();
        let err = cache
            .populate(CapabilityKind::Tools, CapabilityEntries::Tools(vec![]))
            .unwrap_err();
        assert!(matches!(err, CacheError::NotIntroduced(CapabilityKind::Tools)));
    }

    #[test]
    fn parse_list_result_rejects_missing_array() {
        let err = CapabilityCache::parse_list_result(CapabilityKind::Tools, &json!({})).unwrap_err();
        assert!(matches!(err, CacheError::MalformedListReply { .. }));
    }

    #[test]
    fn parse_list_result_accepts_well_formed_tools() {
        let raw = json!({"tools": [{"name": "search", "inputSchema": {"type": "object"}}]});
        let entries = CapabilityCache::parse_list_result(CapabilityKind::Tools, &raw).unwrap();
        assert_eq!(entries.len(), 1);
    }
}
