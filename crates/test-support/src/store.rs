//! A trivial in-memory [`FsmStore`], the same shape as the one `fsm-rt-core`
//! keeps in its own doc tests — exposed here so `fsm-rt`'s integration tests
//! and `sub-fsm` scenarios don't each reinvent it.

use async_trait::async_trait;
use fsm_rt_core::error::Result;
use fsm_rt_core::store::{FsmStore, FsmSummary};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryFsmStore {
    docs: Mutex<HashMap<String, Vec<Value>>>,
}

impl InMemoryFsmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `id` with `doc` as its first (and, if called again, next)
    /// version, returning the version just stored.
    pub fn seed(&self, id: &str, doc: Value) -> u64 {
        let mut docs = self.docs.lock().unwrap();
        let entry = docs.entry(id.to_string()).or_default();
        entry.push(doc);
        entry.len() as u64
    }
}

#[async_trait]
impl FsmStore for InMemoryFsmStore {
    async fn latest_version(&self, id: &str) -> Result<Option<u64>> {
        Ok(self.docs.lock().unwrap().get(id).map(|v| v.len() as u64))
    }

    async fn load(&self, id: &str, version: u64) -> Result<Option<Value>> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .get(id)
            .and_then(|v| v.get((version.saturating_sub(1)) as usize).cloned()))
    }

    async fn store(&self, id: &str, doc: Value) -> Result<()> {
        self.docs.lock().unwrap().entry(id.to_string()).or_default().push(doc);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<FsmSummary>> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .map(|(id, v)| FsmSummary { id: id.clone(), version: v.len() as u64, description: None })
            .collect())
    }
}
