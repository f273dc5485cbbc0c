//! A type-keyed bag for the subsystem-scoped context entries spec §3 names
//! as `bridge/*`, `cache/state`, `llm/service`, `llm/model`: state owned by a
//! crate the core does not (and must not) depend on.
//!
//! The source language's context was a single untyped string-keyed map;
//! Rust's equivalent for "one caller-defined slot per concern, looked up
//! without the definer and the reader sharing a dependency" is a type-keyed
//! extension map (the same shape `http::Extensions`/axum use), so that is
//! what `fsm-rt-bridge`, `fsm-rt-cache` and `fsm-rt-actions` plug their
//! handles into instead of a stringly-typed `Any` lookup.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Extensions {
    map: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new `Extensions` with `value` inserted (or replacing any
    /// existing value of the same type). Immutable-value style, matching
    /// the context's ownership note in spec §3: "actions ... return a new
    /// context when they mutate."
    pub fn with<T: Send + Sync + 'static>(&self, value: T) -> Self {
        let mut map = (*self.map).clone();
        map.insert(TypeId::of::<T>(), Arc::new(value) as Arc<dyn Any + Send + Sync>);
        Self { map: Arc::new(map) }
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|v| v.downcast::<T>().ok())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    /// Returns a new `Extensions` with the slot for `T` removed.
    pub fn without<T: Send + Sync + 'static>(&self) -> Self {
        if !self.contains::<T>() {
            return self.clone();
        }
        let mut map = (*self.map).clone();
        map.remove(&TypeId::of::<T>());
        Self { map: Arc::new(map) }
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions").field("len", &self.map.len()).finish()
    }
}
