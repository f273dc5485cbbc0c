//! Schema emission (spec §4.8 C9): minimises prompt tokens for an
//! LLM-facing schema by inlining references used once and keeping
//! references used repeatedly in a small auxiliary registry, so the prompt
//! can say "see `tool-request`" instead of repeating its shape at every
//! occurrence.
//!
//! Purely structural — it never affects validation, which always resolves
//! references against the session's live [`SchemaRegistry`] regardless of
//! how a schema was last emitted.

use fsm_rt_core::registry::SchemaRegistry;
use fsm_rt_core::schema::{expand, walk_refs, Schema};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmissionError {
    #[error("no schema named {0:?} in the registry")]
    UnknownRoot(String),
}

/// `{inlined-schema, auxiliary-registry}` (spec §4.8).
#[derive(Debug, Clone)]
pub struct Emission {
    pub inlined_schema: Schema,
    pub auxiliary_registry: SchemaRegistry,
    /// Occurrence counts, exposed for callers that want to explain or test
    /// the inline/auxiliary split rather than just consume it.
    pub occurrences: HashMap<String, u32>,
}

/// Emits a schema already in hand (no registry lookup for the root itself,
/// useful for a transition's already-resolved schema).
pub fn emit_schema(root: &Schema, registry: &SchemaRegistry) -> Emission {
    let occurrences = count_occurrences(root, registry);
    let inline_set: HashSet<String> =
        occurrences.iter().filter(|(_, count)| **count == 1).map(|(name, _)| name.clone()).collect();
    let auxiliary_names: Vec<String> =
        occurrences.iter().filter(|(_, count)| **count >= 2).map(|(name, _)| name.clone()).collect();

    let inlined_schema = expand(root, registry, &inline_set);

    let auxiliary_entries = auxiliary_names.into_iter().filter_map(|name| {
        registry.lookup(&name).map(|target| (name, expand(&target, registry, &inline_set)))
    });
    let auxiliary_registry = SchemaRegistry::empty().with_layer(auxiliary_entries);

    Emission { inlined_schema, auxiliary_registry, occurrences }
}

/// Emits a schema looked up by name (spec §4.8: "given a root schema
/// name and a registry").
pub fn emit(root_name: &str, registry: &SchemaRegistry) -> Result<Emission, EmissionError> {
    let root = registry.lookup(root_name).ok_or_else(|| EmissionError::UnknownRoot(root_name.to_string()))?;
    Ok(emit_schema(&root, registry))
}

/// Counts every reference occurrence in the transitive closure reachable
/// from `root`: each time a `Ref` node is encountered while walking `root`
/// or any schema it (transitively) refers to. A name unresolved in
/// `registry` is counted but not expanded further — "refs to unknown names
/// ... pass through verbatim" (spec §4.1).
fn count_occurrences(root: &Schema, registry: &SchemaRegistry) -> HashMap<String, u32> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut queued: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    walk_refs(root, &mut |name| {
        *counts.entry(name.to_string()).or_insert(0) += 1;
        if queued.insert(name.to_string()) {
            queue.push_back(name.to_string());
        }
    });

    while let Some(name) = queue.pop_front() {
        let Some(target) = registry.lookup(&name) else { continue };
        walk_refs(&target, &mut |refname| {
            *counts.entry(refname.to_string()).or_insert(0) += 1;
            if queued.insert(refname.to_string()) {
                queue.push_back(refname.to_string());
            }
        });
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsm_rt_core::schema::Schema;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::base().with_layer([
            ("tool-request".to_string(), Schema::String),
            ("tool-response".to_string(), Schema::Int),
            (
                "envelope".to_string(),
                Schema::Union(vec![Schema::Ref("tool-request".to_string()), Schema::Ref("tool-response".to_string())]),
            ),
        ])
    }

    #[test]
    fn single_use_references_are_inlined() {
        let registry = registry();
        let root = Schema::Ref("tool-response".to_string());
        let emission = emit_schema(&root, &registry);
        assert_eq!(emission.inlined_schema, Schema::Int);
        assert!(emission.auxiliary_registry.lookup("tool-response").is_none());
    }

    #[test]
    fn repeated_references_stay_in_the_auxiliary_registry() {
        let registry = registry();
        // "tool-request" is referenced twice: once directly, once via "envelope".
        let root = Schema::Union(vec![
            Schema::Ref("tool-request".to_string()),
            Schema::Ref("envelope".to_string()),
        ]);
        let emission = emit_schema(&root, &registry);
        assert_eq!(emission.occurrences.get("tool-request"), Some(&2));

        match &emission.inlined_schema {
            Schema::Union(branches) => {
                assert_eq!(branches[0], Schema::Ref("tool-request".to_string()));
            }
            other => panic!("expected union, got {other:?}"),
        }
        assert!(emission.auxiliary_registry.lookup("tool-request").is_some());
        // "tool-response" is referenced once (inside envelope) and is inlined,
        // so it never needs its own auxiliary entry.
        assert!(emission.auxiliary_registry.lookup("tool-response").is_none());
    }

    #[test]
    fn unresolved_refs_pass_through_verbatim() {
        let registry = SchemaRegistry::base();
        let root = Schema::Ref("does-not-exist".to_string());
        let emission = emit_schema(&root, &registry);
        assert_eq!(emission.inlined_schema, Schema::Ref("does-not-exist".to_string()));
    }

    #[test]
    fn emit_by_name_fails_for_unknown_root() {
        let registry = SchemaRegistry::base();
        let err = emit("missing", &registry).unwrap_err();
        assert!(matches!(err, EmissionError::UnknownRoot(_)));
    }
}
