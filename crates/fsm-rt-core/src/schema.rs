//! The structural schema language (spec §3 "Schema value", §4.1 C1).
//!
//! A [`Schema`] is always walkable: every variant can be matched without
//! evaluating code, which is what lets [`emit`](crate::emission) inline and
//! the dynamic-schema generator in `fsm-rt-cache` build schemas from plain
//! data at runtime.

use crate::error::{FsmError, Result};
use crate::registry::SchemaRegistry;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// One entry of a [`Schema::Map`].
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: String,
    pub optional: bool,
    pub schema: Box<Schema>,
}

/// A structural schema value (spec §3).
///
/// Open Question #1 is resolved here: a transition whose `schema` field is
/// the JSON literal `true` deserializes to [`Schema::Any`] — "permit
/// anything", not "reject unless another branch matches" (see DESIGN.md).
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    String,
    Int,
    Boolean,
    Any,
    /// A map schema. `closed` rejects any key not listed in `entries`; an
    /// open map permits extra keys, which are left unvalidated.
    Map { closed: bool, entries: Vec<MapEntry> },
    /// A homogeneous vector (ordered) collection.
    Vector(Box<Schema>),
    /// A homogeneous set (unordered, deduplicated) collection. Validated
    /// structurally like a vector — uniqueness is not itself enforced,
    /// matching the source's treatment of "set" as a collection tag rather
    /// than a semantic constraint.
    Set(Box<Schema>),
    /// Tried left-to-right; the first branch that validates wins. All
    /// branches are preserved for emission (§4.8).
    Union(Vec<Schema>),
    /// A fixed value the input must equal exactly.
    Literal(Value),
    /// The value must equal one of the listed literals.
    Enum(Vec<Value>),
    /// A named reference, resolved against a [`SchemaRegistry`].
    Ref(String),
}

impl Schema {
    pub fn map(closed: bool, entries: Vec<MapEntry>) -> Self {
        Schema::Map { closed, entries }
    }

    pub fn closed_map(entries: Vec<MapEntry>) -> Self {
        Schema::Map { closed: true, entries }
    }

    pub fn entry(key: impl Into<String>, optional: bool, schema: Schema) -> MapEntry {
        MapEntry { key: key.into(), optional, schema: Box::new(schema) }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Schema::Ref(_))
    }
}

/// Structural validation failure (spec §4.1 `value-invalid`).
#[derive(Debug, Clone, thiserror::Error)]
#[error("value-invalid at {path}: {message}")]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

fn join_path(path: &str, segment: impl fmt::Display) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

/// `validate(schema, value, registry)` — spec §4.1.
pub fn validate(schema: &Schema, value: &Value, registry: &SchemaRegistry) -> Result<()> {
    validate_at(schema, value, registry, "$")
}

fn validate_at(
    schema: &Schema,
    value: &Value,
    registry: &SchemaRegistry,
    path: &str,
) -> Result<()> {
    match schema {
        Schema::Any => Ok(()),
        Schema::String => match value {
            Value::String(_) => Ok(()),
            other => Err(mismatch(path, "string", other)),
        },
        Schema::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
            other => Err(mismatch(path, "int", other)),
        },
        Schema::Boolean => match value {
            Value::Bool(_) => Ok(()),
            other => Err(mismatch(path, "boolean", other)),
        },
        Schema::Literal(expected) => {
            if value == expected {
                Ok(())
            } else {
                Err(FsmError::Validation {
                    path: path.to_string(),
                    message: format!("expected literal {expected}, got {value}"),
                })
            }
        }
        Schema::Enum(choices) => {
            if choices.iter().any(|c| c == value) {
                Ok(())
            } else {
                Err(FsmError::Validation {
                    path: path.to_string(),
                    message: format!("{value} is not one of {choices:?}"),
                })
            }
        }
        Schema::Vector(inner) | Schema::Set(inner) => match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_at(inner, item, registry, &join_path(path, format!("[{i}]")))?;
                }
                Ok(())
            }
            other => Err(mismatch(path, "array", other)),
        },
        Schema::Map { closed, entries } => {
            let obj = match value {
                Value::Object(obj) => obj,
                other => return Err(mismatch(path, "object", other)),
            };
            for entry in entries {
                let child_path = join_path(path, &entry.key);
                match obj.get(&entry.key) {
                    Some(Value::Null) if entry.optional => {
                        // Optional entries may be absent but not null, unless
                        // the entry's own schema admits null (Any).
                        if !matches!(*entry.schema, Schema::Any) {
                            return Err(FsmError::Validation {
                                path: child_path,
                                message: "optional entry present as null".to_string(),
                            });
                        }
                    }
                    Some(v) => validate_at(&entry.schema, v, registry, &child_path)?,
                    None if entry.optional => {}
                    None => {
                        return Err(FsmError::Validation {
                            path: child_path,
                            message: "required key missing".to_string(),
                        });
                    }
                }
            }
            if *closed {
                let known: HashSet<&str> = entries.iter().map(|e| e.key.as_str()).collect();
                for key in obj.keys() {
                    if !known.contains(key.as_str()) {
                        return Err(FsmError::Validation {
                            path: join_path(path, key),
                            message: "key not permitted by closed map schema".to_string(),
                        });
                    }
                }
            }
            Ok(())
        }
        Schema::Union(branches) => {
            let mut last_err = None;
            for branch in branches {
                match validate_at(branch, value, registry, path) {
                    Ok(()) => return Ok(()),
                    Err(e) => last_err = Some(e),
                }
            }
            Err(last_err.unwrap_or_else(|| FsmError::Validation {
                path: path.to_string(),
                message: "empty union".to_string(),
            }))
        }
        Schema::Ref(name) => {
            let resolved = registry
                .lookup(name)
                .ok_or_else(|| FsmError::RefUnresolved(name.clone()))?;
            validate_at(&resolved, value, registry, path)
        }
    }
}

fn mismatch(path: &str, expected: &str, actual: &Value) -> FsmError {
    FsmError::Validation {
        path: path.to_string(),
        message: format!("expected {expected}, got {actual}"),
    }
}

/// `expand(schema, registry, inlineSet)` — spec §4.1.
///
/// Recursively replaces any `Ref(name)` whose `name` is in `inline_set` with
/// the referenced schema (itself expanded). Refs whose target is *not* in
/// `inline_set`, or whose target is altogether unknown, pass through
/// verbatim — callers doing validation should reject unknown refs
/// themselves; `expand` is a structural rewrite used by emission, not a
/// validation pass.
pub fn expand(schema: &Schema, registry: &SchemaRegistry, inline_set: &HashSet<String>) -> Schema {
    match schema {
        Schema::Ref(name) if inline_set.contains(name) => match registry.lookup(name) {
            Some(target) => expand(&target, registry, inline_set),
            None => schema.clone(),
        },
        Schema::Vector(inner) => Schema::Vector(Box::new(expand(inner, registry, inline_set))),
        Schema::Set(inner) => Schema::Set(Box::new(expand(inner, registry, inline_set))),
        Schema::Union(branches) => {
            Schema::Union(branches.iter().map(|b| expand(b, registry, inline_set)).collect())
        }
        Schema::Map { closed, entries } => Schema::Map {
            closed: *closed,
            entries: entries
                .iter()
                .map(|e| MapEntry {
                    key: e.key.clone(),
                    optional: e.optional,
                    schema: Box::new(expand(&e.schema, registry, inline_set)),
                })
                .collect(),
        },
        other => other.clone(),
    }
}

/// Walks a schema's reference graph, invoking `visit` with every `Ref` name
/// encountered (including duplicates). Used by emission (C9) to count
/// occurrences before deciding what to inline.
pub fn walk_refs(schema: &Schema, visit: &mut impl FnMut(&str)) {
    match schema {
        Schema::Ref(name) => visit(name),
        Schema::Vector(inner) | Schema::Set(inner) => walk_refs(inner, visit),
        Schema::Union(branches) => branches.iter().for_each(|b| walk_refs(b, visit)),
        Schema::Map { entries, .. } => entries.iter().for_each(|e| walk_refs(&e.schema, visit)),
        _ => {}
    }
}

// --- (De)serialization -----------------------------------------------------
//
// Schema values travel as JSON inside FSM documents. They are tagged objects
// (`{"kind": "map", ...}`) except for the literal boolean `true`, which is a
// schema in its own right (Open Question #1: means `Any`).

impl Serialize for Schema {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Schema::String => tagged(serializer, "string", |_| Ok(())),
            Schema::Int => tagged(serializer, "int", |_| Ok(())),
            Schema::Boolean => tagged(serializer, "boolean", |_| Ok(())),
            Schema::Any => tagged(serializer, "any", |_| Ok(())),
            Schema::Map { closed, entries } => tagged(serializer, "map", |map| {
                map.serialize_entry("closed", closed)?;
                map.serialize_entry("entries", entries)?;
                Ok(())
            }),
            Schema::Vector(inner) => {
                tagged(serializer, "vector", |map| map.serialize_entry("of", inner))
            }
            Schema::Set(inner) => {
                tagged(serializer, "set", |map| map.serialize_entry("of", inner))
            }
            Schema::Union(branches) => {
                tagged(serializer, "union", |map| map.serialize_entry("of", branches))
            }
            Schema::Literal(value) => {
                tagged(serializer, "literal", |map| map.serialize_entry("value", value))
            }
            Schema::Enum(choices) => {
                tagged(serializer, "enum", |map| map.serialize_entry("values", choices))
            }
            Schema::Ref(name) => {
                tagged(serializer, "ref", |map| map.serialize_entry("name", name))
            }
        }
    }
}

fn tagged<S, F>(serializer: S, kind: &str, body: F) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    F: FnOnce(&mut S::SerializeMap) -> std::result::Result<(), S::Error>,
{
    let mut map = serializer.serialize_map(None)?;
    map.serialize_entry("kind", kind)?;
    body(&mut map)?;
    map.end()
}

impl Serialize for MapEntry {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("key", &self.key)?;
        map.serialize_entry("optional", &self.optional)?;
        map.serialize_entry("schema", &self.schema)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = Schema;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a schema value: a tagged object or the boolean `true`")
            }

            fn visit_bool<E>(self, v: bool) -> std::result::Result<Schema, E>
            where
                E: de::Error,
            {
                if v {
                    Ok(Schema::Any)
                } else {
                    Err(de::Error::custom(
                        "schema literal `false` is not meaningful (did you mean `true`?)",
                    ))
                }
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Schema, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut raw: serde_json::Map<String, Value> = serde_json::Map::new();
                while let Some((k, v)) = map.next_entry::<String, Value>()? {
                    raw.insert(k, v);
                }
                schema_from_object(raw).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(SchemaVisitor)
    }
}

fn schema_from_object(mut raw: serde_json::Map<String, Value>) -> std::result::Result<Schema, String> {
    let kind = raw
        .remove("kind")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or("schema object missing string field `kind`")?;
    match kind.as_str() {
        "string" => Ok(Schema::String),
        "int" => Ok(Schema::Int),
        "boolean" => Ok(Schema::Boolean),
        "any" => Ok(Schema::Any),
        "map" => {
            let closed = raw.get("closed").and_then(Value::as_bool).unwrap_or(true);
            let entries = raw
                .remove("entries")
                .ok_or("map schema missing `entries`")?;
            let entries: Vec<MapEntry> =
                serde_json::from_value(entries).map_err(|e| e.to_string())?;
            Ok(Schema::Map { closed, entries })
        }
        "vector" => {
            let of = raw.remove("of").ok_or("vector schema missing `of`")?;
            let of: Schema = serde_json::from_value(of).map_err(|e| e.to_string())?;
            Ok(Schema::Vector(Box::new(of)))
        }
        "set" => {
            let of = raw.remove("of").ok_or("set schema missing `of`")?;
            let of: Schema = serde_json::from_value(of).map_err(|e| e.to_string())?;
            Ok(Schema::Set(Box::new(of)))
        }
        "union" => {
            let of = raw.remove("of").ok_or("union schema missing `of`")?;
            let of: Vec<Schema> = serde_json::from_value(of).map_err(|e| e.to_string())?;
            Ok(Schema::Union(of))
        }
        "literal" => {
            let value = raw.remove("value").ok_or("literal schema missing `value`")?;
            Ok(Schema::Literal(value))
        }
        "enum" => {
            let values = raw.remove("values").ok_or("enum schema missing `values`")?;
            let values: Vec<Value> = serde_json::from_value(values).map_err(|e| e.to_string())?;
            Ok(Schema::Enum(values))
        }
        "ref" => {
            let name = raw
                .remove("name")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or("ref schema missing string field `name`")?;
            Ok(Schema::Ref(name))
        }
        other => Err(format!("unknown schema kind: {other}")),
    }
}

impl<'de> Deserialize<'de> for MapEntry {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            key: String,
            #[serde(default)]
            optional: bool,
            schema: Schema,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(MapEntry { key: raw.key, optional: raw.optional, schema: Box::new(raw.schema) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaRegistry;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::empty()
    }

    #[test]
    fn true_literal_means_any() {
        let schema: Schema = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(schema, Schema::Any);
        validate(&schema, &json!(null), &registry()).unwrap();
        validate(&schema, &json!({"x": 1}), &registry()).unwrap();
    }

    #[test]
    fn closed_map_rejects_unknown_keys() {
        let schema = Schema::closed_map(vec![Schema::entry("n", false, Schema::Int)]);
        validate(&schema, &json!({"n": 1}), &registry()).unwrap();
        let err = validate(&schema, &json!({"n": 1, "extra": true}), &registry()).unwrap_err();
        assert!(matches!(err, FsmError::Validation { .. }));
    }

    #[test]
    fn optional_entry_may_be_absent_but_not_null() {
        let schema = Schema::closed_map(vec![Schema::entry("n", true, Schema::Int)]);
        validate(&schema, &json!({}), &registry()).unwrap();
        let err = validate(&schema, &json!({"n": null}), &registry()).unwrap_err();
        assert!(matches!(err, FsmError::Validation { .. }));
    }

    #[test]
    fn union_tries_branches_left_to_right() {
        let schema = Schema::Union(vec![Schema::Int, Schema::String]);
        validate(&schema, &json!(1), &registry()).unwrap();
        validate(&schema, &json!("x"), &registry()).unwrap();
        assert!(validate(&schema, &json!(true), &registry()).is_err());
    }

    #[test]
    fn ref_resolves_through_registry() {
        let registry = SchemaRegistry::empty().with_layer([("n".to_string(), Schema::Int)]);
        validate(&Schema::Ref("n".to_string()), &json!(3), &registry).unwrap();
        let err = validate(&Schema::Ref("missing".to_string()), &json!(3), &registry).unwrap_err();
        assert!(matches!(err, FsmError::RefUnresolved(_)));
    }

    #[test]
    fn round_trips_through_json() {
        let schema = Schema::Union(vec![
            Schema::closed_map(vec![Schema::entry("a", false, Schema::Ref("b".into()))]),
            Schema::Vector(Box::new(Schema::Enum(vec![json!("x"), json!("y")]))),
        ]);
        let value = serde_json::to_value(&schema).unwrap();
        let round_tripped: Schema = serde_json::from_value(value).unwrap();
        assert_eq!(schema, round_tripped);
    }
}
