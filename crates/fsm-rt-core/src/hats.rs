//! Hat expansion (spec §3 "hats", §9).
//!
//! A hat is a reusable FSM fragment a state can wear: extra states and
//! transitions contributed to the FSM at load time. Per spec §9, the
//! dynamic "inject a fragment at runtime" behaviour of the source becomes a
//! one-shot, compile-time-shaped expansion here: [`expand_hats`] runs once,
//! before the engine starts, and produces a flat, ordinary
//! [`FsmDefinition`] the engine never has to treat specially.

use crate::error::{FsmError, Result};
use crate::fsm::{FsmDefinition, StateDef, XitionDef, XitionId};
use std::collections::HashMap;
use std::sync::Arc;

/// A named fragment: states and transitions to splice into the FSM that
/// wears it. State/transition ids inside the fragment are local names —
/// `expand_hats` namespaces them under the wearing state's id so two states
/// wearing the same hat never collide.
#[derive(Clone)]
pub struct Hat {
    pub name: String,
    pub states: Vec<StateDef>,
    pub xitions: Vec<XitionDef>,
}

impl Hat {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), states: Vec::new(), xitions: Vec::new() }
    }

    pub fn with_states(mut self, states: Vec<StateDef>) -> Self {
        self.states = states;
        self
    }

    pub fn with_xitions(mut self, xitions: Vec<XitionDef>) -> Self {
        self.xitions = xitions;
        self
    }
}

#[derive(Clone, Default)]
pub struct HatRegistry {
    hats: HashMap<String, Arc<Hat>>,
}

impl HatRegistry {
    pub fn builder() -> HatRegistryBuilder {
        HatRegistryBuilder { hats: HashMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Hat>> {
        self.hats.get(name).cloned()
    }
}

pub struct HatRegistryBuilder {
    hats: HashMap<String, Arc<Hat>>,
}

impl HatRegistryBuilder {
    pub fn register(mut self, hat: Hat) -> Self {
        self.hats.insert(hat.name.clone(), Arc::new(hat));
        self
    }

    pub fn build(self) -> HatRegistry {
        HatRegistry { hats: self.hats }
    }
}

fn namespaced(host_state: &str, local_id: &str) -> String {
    format!("{host_state}/{local_id}")
}

/// `"start"`/`"end"` and the host state's own id are never namespaced —
/// a hat's fragment transitions into/out of those by referencing them
/// verbatim, wiring the fragment onto the state that wears it.
fn rewrite_state_id(host_state: &str, local_id: &str, host_states: &std::collections::HashSet<&str>) -> String {
    if local_id == crate::fsm::START || local_id == crate::fsm::END || host_states.contains(local_id) {
        local_id.to_string()
    } else {
        namespaced(host_state, local_id)
    }
}

/// Expands every state's `hats` into the flat set of states/transitions the
/// engine executes directly. Idempotent: an already-expanded `FsmDefinition`
/// (one whose states carry no `hats`) passes through unchanged.
pub fn expand_hats(fsm: &FsmDefinition, hats: &HatRegistry) -> Result<FsmDefinition> {
    if fsm.states.iter().all(|s| s.hats.is_empty()) {
        return Ok(fsm.clone());
    }

    let host_state_ids: std::collections::HashSet<&str> =
        fsm.states.iter().map(|s| s.id.as_str()).collect();

    let mut states = Vec::with_capacity(fsm.states.len());
    let mut xitions = fsm.xitions.clone();

    for state in &fsm.states {
        let mut flattened = state.clone();
        flattened.hats.clear();
        for hat_name in &state.hats {
            let hat = hats
                .get(hat_name)
                .ok_or_else(|| FsmError::Config(format!("unknown hat '{hat_name}'")))?;

            for hat_state in &hat.states {
                let mut contributed = hat_state.clone();
                contributed.id = rewrite_state_id(&state.id, &hat_state.id, &host_state_ids);
                states.push(contributed);
            }
            for hat_xition in &hat.xitions {
                let from = rewrite_state_id(&state.id, &hat_xition.id.from, &host_state_ids);
                let to = rewrite_state_id(&state.id, &hat_xition.id.to, &host_state_ids);
                let mut contributed = hat_xition.clone();
                contributed.id = XitionId::new(from, to);
                xitions.push(contributed);
            }
        }
        states.push(flattened);
    }

    let expanded = FsmDefinition {
        id: fsm.id.clone(),
        description: fsm.description.clone(),
        prompts: fsm.prompts.clone(),
        schemas: fsm.schemas.clone(),
        states,
        xitions,
    };
    expanded.validate_invariants()?;
    Ok(expanded)
}
