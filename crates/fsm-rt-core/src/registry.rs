//! The composite schema registry (spec §4.2, C2).
//!
//! Lookup chains newest-first: base primitives < FSM-local `schemas` <
//! subsystem-contributed fragments (e.g. the bridge contributes
//! `tool-request`/`tool-response` once connected — see `fsm-rt-cache`).
//! Registries are immutable after composition, so composing a new layer on
//! top is an `Arc` clone plus one small `HashMap`, never a copy of the whole
//! chain.

use crate::schema::Schema;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
enum Node {
    Root,
    Layer { schemas: HashMap<String, Schema>, parent: Arc<Node> },
}

/// An immutable, cheaply-cloneable chain of named schema fragments.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    node: Arc<Node>,
}

impl SchemaRegistry {
    /// A registry with no entries — the base of every chain.
    pub fn empty() -> Self {
        Self { node: Arc::new(Node::Root) }
    }

    /// The base registry of primitive names, so FSM authors can
    /// `[ref "string"]` etc. instead of repeating primitive tags.
    pub fn base() -> Self {
        Self::empty().with_layer([
            ("string".to_string(), Schema::String),
            ("int".to_string(), Schema::Int),
            ("boolean".to_string(), Schema::Boolean),
            ("any".to_string(), Schema::Any),
        ])
    }

    /// Composes a new registry with `schemas` layered on top — lookups
    /// prefer entries here over anything in `self`.
    pub fn with_layer(&self, schemas: impl IntoIterator<Item = (String, Schema)>) -> Self {
        let schemas: HashMap<String, Schema> = schemas.into_iter().collect();
        if schemas.is_empty() {
            return self.clone();
        }
        Self { node: Arc::new(Node::Layer { schemas, parent: self.node.clone() }) }
    }

    /// Looks up `name`, walking the chain newest-first.
    pub fn lookup(&self, name: &str) -> Option<Schema> {
        let mut current = &self.node;
        loop {
            match current.as_ref() {
                Node::Root => return None,
                Node::Layer { schemas, parent } => {
                    if let Some(schema) = schemas.get(name) {
                        return Some(schema.clone());
                    }
                    current = parent;
                }
            }
        }
    }

    /// All names reachable from this registry, newest layer's shadowing
    /// names taking precedence — used by emission to enumerate candidates.
    pub fn names(&self) -> Vec<String> {
        let mut seen = HashMap::new();
        let mut current = &self.node;
        loop {
            match current.as_ref() {
                Node::Root => break,
                Node::Layer { schemas, parent } => {
                    for name in schemas.keys() {
                        seen.entry(name.clone()).or_insert(());
                    }
                    current = parent;
                }
            }
        }
        seen.into_keys().collect()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::base()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_layer_shadows_older_ones() {
        let base = SchemaRegistry::empty().with_layer([("n".to_string(), Schema::Int)]);
        let over = base.with_layer([("n".to_string(), Schema::String)]);
        assert_eq!(over.lookup("n"), Some(Schema::String));
        assert_eq!(base.lookup("n"), Some(Schema::Int));
    }

    #[test]
    fn composition_is_cheap_and_independent() {
        let base = SchemaRegistry::base();
        let fsm_local = base.with_layer([("widget".to_string(), Schema::Any)]);
        let with_bridge = fsm_local.with_layer([("tool-request".to_string(), Schema::Any)]);
        assert!(with_bridge.lookup("string").is_some());
        assert!(with_bridge.lookup("widget").is_some());
        assert!(fsm_local.lookup("tool-request").is_none());
    }
}
