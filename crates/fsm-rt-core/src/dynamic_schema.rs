//! Dynamic schema functions (spec §4.1 `resolve`, glossary "Dynamic schema
//! function").
//!
//! A dynamic schema function is `(context, xition) -> schema`, used when the
//! legal shape of an event depends on runtime state — most importantly the
//! capability cache (`fsm-rt-cache`'s `mcp-request-schema`/
//! `mcp-response-schema`, spec §4.4). It must be total on valid contexts and
//! idempotent; callers may call it any number of times with no side effects.

use crate::context::RunContext;
use crate::error::{FsmError, Result};
use crate::fsm::{SchemaOrKey, XitionDef};
use crate::schema::Schema;
use std::collections::HashMap;
use std::sync::Arc;

/// `(context, xition) -> schema`.
pub trait DynamicSchemaFn: Send + Sync {
    fn resolve(&self, context: &RunContext, xition: &XitionDef) -> Result<Schema>;
}

impl<F> DynamicSchemaFn for F
where
    F: Fn(&RunContext, &XitionDef) -> Result<Schema> + Send + Sync,
{
    fn resolve(&self, context: &RunContext, xition: &XitionDef) -> Result<Schema> {
        self(context, xition)
    }
}

/// The `id -> schema` registry of dynamic schema functions (spec §3
/// "Context" recognized key).
#[derive(Clone, Default)]
pub struct DynamicSchemaRegistry {
    functions: Arc<HashMap<String, Arc<dyn DynamicSchemaFn>>>,
}

impl DynamicSchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> DynamicSchemaRegistryBuilder {
        DynamicSchemaRegistryBuilder { functions: HashMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DynamicSchemaFn>> {
        self.functions.get(name).cloned()
    }

    pub fn resolve(&self, name: &str, context: &RunContext, xition: &XitionDef) -> Result<Schema> {
        self.get(name)
            .ok_or_else(|| FsmError::NoSuchSchemaFunction(name.to_string()))?
            .resolve(context, xition)
    }
}

pub struct DynamicSchemaRegistryBuilder {
    functions: HashMap<String, Arc<dyn DynamicSchemaFn>>,
}

impl DynamicSchemaRegistryBuilder {
    pub fn register(mut self, name: impl Into<String>, f: impl DynamicSchemaFn + 'static) -> Self {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }

    pub fn build(self) -> DynamicSchemaRegistry {
        DynamicSchemaRegistry { functions: Arc::new(self.functions) }
    }
}

/// `resolve(schemaOrKey, context, xition, registry)` (spec §4.1 C1): an
/// inline schema passes through unchanged; a named one dispatches to the
/// context's dynamic schema registry.
pub fn resolve_schema(schema_or_key: &SchemaOrKey, context: &RunContext, xition: &XitionDef) -> Result<Schema> {
    match schema_or_key {
        SchemaOrKey::Inline(schema) => Ok(schema.clone()),
        SchemaOrKey::Dynamic(name) => context.dynamic_schemas.resolve(name, context, xition),
    }
}
