//! FSM definition data model (spec §3).
//!
//! An [`FsmDefinition`] is an immutable value: states, transitions
//! ("xitions"), and the per-FSM schema fragments they reference. Per spec §9
//! ("macros generating definitions"), there is deliberately no DSL here —
//! a caller builds one with ordinary constructors, and [`FsmDefinition::new`]
//! runs the invariant checks described below once, at load time.

use crate::error::{FsmError, Result};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const START: &str = "start";
pub const END: &str = "end";

/// The ordered pair `[from, to]` that identifies one transition.
///
/// Serializes as a two-element JSON array, matching the wire shape of an
/// event's mandatory `"id"` field (spec §3 "Event").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct XitionId {
    pub from: String,
    pub to: String,
}

impl XitionId {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into() }
    }
}

impl fmt::Display for XitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

impl Serialize for XitionId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        (&self.from, &self.to).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for XitionId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (from, to) = <(String, String)>::deserialize(deserializer)?;
        Ok(XitionId { from, to })
    }
}

/// Whether a transition's schema is given inline or names a dynamic schema
/// function to resolve against the live context (spec §4.1 `resolve`).
#[derive(Debug, Clone)]
pub enum SchemaOrKey {
    Inline(Schema),
    Dynamic(String),
}

impl Serialize for SchemaOrKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            SchemaOrKey::Inline(schema) => schema.serialize(serializer),
            SchemaOrKey::Dynamic(key) => key.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SchemaOrKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        if let serde_json::Value::String(key) = &value {
            return Ok(SchemaOrKey::Dynamic(key.clone()));
        }
        let schema: Schema = serde_json::from_value(value).map_err(serde::de::Error::custom)?;
        Ok(SchemaOrKey::Inline(schema))
    }
}

/// One state (spec §3 "states"). `action` names an entry in the action
/// registry; states without an action (e.g. plain waypoints) are legal only
/// if no event ever resolves them as a destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDef {
    pub id: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub prompts: Vec<String>,
    /// Names of hats (§9) attached to this state, expanded before the
    /// engine ever sees the FSM — see [`crate::hats`].
    #[serde(default)]
    pub hats: Vec<String>,
    /// The per-state configuration block an action's factory validates
    /// against its `config_schema` at session start (spec §4.7).
    #[serde(default)]
    pub config: serde_json::Value,
}

impl StateDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: None,
            prompts: Vec::new(),
            hats: Vec::new(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_prompts(mut self, prompts: impl IntoIterator<Item = String>) -> Self {
        self.prompts = prompts.into_iter().collect();
        self
    }

    pub fn with_hats(mut self, hats: impl IntoIterator<Item = String>) -> Self {
        self.hats = hats.into_iter().collect();
        self
    }
}

/// One transition (spec §3 "xitions").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XitionDef {
    pub id: XitionId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompts: Vec<String>,
    pub schema: SchemaOrKey,
    /// Excludes this transition's events from the displayed trail, per
    /// spec §3; the engine still appends a compact placeholder (§4.5 step 5).
    #[serde(default)]
    pub omit: bool,
}

impl XitionDef {
    pub fn new(from: impl Into<String>, to: impl Into<String>, schema: Schema) -> Self {
        Self {
            id: XitionId::new(from, to),
            label: None,
            description: None,
            prompts: Vec::new(),
            schema: SchemaOrKey::Inline(schema),
            omit: false,
        }
    }

    pub fn dynamic(from: impl Into<String>, to: impl Into<String>, schema_fn: impl Into<String>) -> Self {
        Self {
            id: XitionId::new(from, to),
            label: None,
            description: None,
            prompts: Vec::new(),
            schema: SchemaOrKey::Dynamic(schema_fn.into()),
            omit: false,
        }
    }

    pub fn omitted(mut self) -> Self {
        self.omit = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// An immutable FSM definition (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsmDefinition {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub schemas: std::collections::HashMap<String, Schema>,
    pub states: Vec<StateDef>,
    pub xitions: Vec<XitionDef>,
}

impl FsmDefinition {
    /// Constructs and validates an FSM definition, enforcing the invariants
    /// in spec §3: transition ids are unique, and every `from`/`to` names a
    /// declared state or the reserved `start`/`end`.
    pub fn new(
        id: impl Into<String>,
        states: Vec<StateDef>,
        xitions: Vec<XitionDef>,
    ) -> Result<Self> {
        let fsm = Self {
            id: id.into(),
            description: None,
            prompts: Vec::new(),
            schemas: Default::default(),
            states,
            xitions,
        };
        fsm.validate_invariants()?;
        Ok(fsm)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_prompts(mut self, prompts: impl IntoIterator<Item = String>) -> Self {
        self.prompts = prompts.into_iter().collect();
        self
    }

    pub fn with_schemas(mut self, schemas: impl IntoIterator<Item = (String, Schema)>) -> Self {
        self.schemas.extend(schemas);
        self
    }

    /// Re-runs the invariant checks; used by [`crate::hats::expand_hats`]
    /// after it rewrites states/xitions, and by `FsmStore` consumers before
    /// trusting a loaded document.
    pub fn validate_invariants(&self) -> Result<()> {
        let mut known_states: HashSet<&str> = self.states.iter().map(|s| s.id.as_str()).collect();
        known_states.insert(START);
        known_states.insert(END);

        let mut seen_ids = HashSet::new();
        for xition in &self.xitions {
            if !seen_ids.insert((xition.id.from.as_str(), xition.id.to.as_str())) {
                return Err(FsmError::Config(format!(
                    "duplicate transition id {}",
                    xition.id
                )));
            }
            if !known_states.contains(xition.id.from.as_str()) {
                return Err(FsmError::Config(format!(
                    "transition {} references unknown state '{}'",
                    xition.id, xition.id.from
                )));
            }
            if !known_states.contains(xition.id.to.as_str()) {
                return Err(FsmError::Config(format!(
                    "transition {} references unknown state '{}'",
                    xition.id, xition.id.to
                )));
            }
        }
        Ok(())
    }

    pub fn state(&self, id: &str) -> Option<&StateDef> {
        self.states.iter().find(|s| s.id == id)
    }

    /// Finds the transition whose id equals `xition_id` (spec §4.5 step 2).
    pub fn transition(&self, xition_id: &XitionId) -> Option<&XitionDef> {
        self.xitions.iter().find(|x| x.id == *xition_id)
    }
}

impl PartialEq for XitionId {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from && self.to == other.to
    }
}
impl Eq for XitionId {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_transition_ids_are_rejected() {
        let states = vec![StateDef::new("a").with_action("noop")];
        let xitions = vec![
            XitionDef::new(START, "a", Schema::Any),
            XitionDef::new(START, "a", Schema::Any),
        ];
        let err = FsmDefinition::new("dup", states, xitions).unwrap_err();
        assert!(matches!(err, FsmError::Config(_)));
    }

    #[test]
    fn unknown_state_reference_is_rejected() {
        let states = vec![StateDef::new("a").with_action("noop")];
        let xitions = vec![XitionDef::new("a", "ghost", Schema::Any)];
        let err = FsmDefinition::new("ghost", states, xitions).unwrap_err();
        assert!(matches!(err, FsmError::Config(_)));
    }

    #[test]
    fn start_and_end_are_always_known() {
        let states = vec![StateDef::new("a").with_action("noop")];
        let xitions = vec![XitionDef::new(START, "a", Schema::Any), XitionDef::new("a", END, Schema::Any)];
        FsmDefinition::new("ok", states, xitions).unwrap();
    }
}
