//! Traits for the collaborators spec §1 places out of scope: FSM persistence
//! and concrete LLM clients. The core only ever sees these two interfaces;
//! `test-support` ships trivial implementations for tests, and a real binary
//! (`fsm-agent-runner`) or an embedding application supplies production ones.

use crate::error::Result;
use crate::fsm::FsmDefinition;
use crate::schema::Schema;
use async_trait::async_trait;
use serde_json::Value;

/// One entry of [`FsmStore::list`].
#[derive(Debug, Clone)]
pub struct FsmSummary {
    pub id: String,
    pub version: u64,
    pub description: Option<String>,
}

/// `FSMStore` (spec §6): `load(id,version)/latest(id)/store(id,doc)/list()`.
///
/// `doc` is a JSON value with a `$version` integer field; [`FsmStore::refresh`]
/// increments the version if and only if the freshly-loaded document differs
/// from the current one once `$version` is stripped from the comparison.
#[async_trait]
pub trait FsmStore: Send + Sync {
    async fn latest_version(&self, id: &str) -> Result<Option<u64>>;
    async fn load(&self, id: &str, version: u64) -> Result<Option<Value>>;
    async fn store(&self, id: &str, doc: Value) -> Result<()>;
    async fn list(&self) -> Result<Vec<FsmSummary>>;

    /// Loads a fresh document via `loader`, bumps the stored version only if
    /// it differs (ignoring `$version`) from the current latest, and
    /// returns the version now current for `id`.
    async fn refresh<L>(&self, id: &str, loader: L) -> Result<u64>
    where
        L: FnOnce() -> Value + Send,
        Self: Sized,
    {
        let loaded = strip_version(loader());
        let current_version = self.latest_version(id).await?;
        if let Some(version) = current_version {
            if let Some(current_doc) = self.load(id, version).await? {
                if strip_version(current_doc) == loaded {
                    return Ok(version);
                }
            }
        }
        let next_version = current_version.unwrap_or(0) + 1;
        let mut doc = loaded;
        if let Value::Object(map) = &mut doc {
            map.insert("$version".to_string(), Value::from(next_version));
        }
        self.store(id, doc).await?;
        Ok(next_version)
    }
}

fn strip_version(mut doc: Value) -> Value {
    if let Value::Object(map) = &mut doc {
        map.remove("$version");
    }
    doc
}

/// Parses and validates an `FsmDefinition` out of a stored JSON document,
/// the step a caller takes between `FsmStore::load` and `startFSM`.
pub fn parse_fsm_document(doc: &Value) -> Result<FsmDefinition> {
    let fsm: FsmDefinition = serde_json::from_value(doc.clone())
        .map_err(|e| crate::error::FsmError::Config(format!("invalid FSM document: {e}")))?;
    fsm.validate_invariants()?;
    Ok(fsm)
}

/// A concrete LLM client (spec §1 "Out of scope"): `invoke(prompts, schema,
/// callback)`. The core never constructs one; it only holds a client behind
/// this trait, looked up by service name.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends `prompts` to the underlying model, constrained by `schema`,
    /// and returns the raw textual reply for the LLM action to parse
    /// (spec §4.6 steps 2-3). Returning raw text rather than a
    /// pre-parsed value keeps the "strip incidental wrapping" and
    /// "parse, then validate" steps squarely in the LLM action, where the
    /// retry loop lives.
    async fn invoke(&self, prompts: &[String], schema: &Schema) -> Result<String>;
}

/// Registry of [`LlmClient`]s keyed by service name (spec §1).
#[derive(Clone, Default)]
pub struct LlmClientRegistry {
    clients: std::sync::Arc<std::collections::HashMap<String, std::sync::Arc<dyn LlmClient>>>,
}

impl LlmClientRegistry {
    pub fn builder() -> LlmClientRegistryBuilder {
        LlmClientRegistryBuilder { clients: std::collections::HashMap::new() }
    }

    pub fn get(&self, service: &str) -> Option<std::sync::Arc<dyn LlmClient>> {
        self.clients.get(service).cloned()
    }
}

pub struct LlmClientRegistryBuilder {
    clients: std::collections::HashMap<String, std::sync::Arc<dyn LlmClient>>,
}

impl LlmClientRegistryBuilder {
    pub fn register(mut self, service: impl Into<String>, client: impl LlmClient + 'static) -> Self {
        self.clients.insert(service.into(), std::sync::Arc::new(client));
        self
    }

    pub fn build(self) -> LlmClientRegistry {
        LlmClientRegistry { clients: std::sync::Arc::new(self.clients) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryStore {
        docs: Mutex<std::collections::HashMap<String, Vec<Value>>>,
    }

    #[async_trait]
    impl FsmStore for InMemoryStore {
        async fn latest_version(&self, id: &str) -> Result<Option<u64>> {
            Ok(self.docs.lock().unwrap().get(id).map(|v| v.len() as u64))
        }
        async fn load(&self, id: &str, version: u64) -> Result<Option<Value>> {
            Ok(self
                .docs
                .lock()
                .unwrap()
                .get(id)
                .and_then(|v| v.get((version - 1) as usize).cloned()))
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

    #[tokio::test]
    async fn refresh_bumps_version_only_on_real_change() {
        let store = InMemoryStore::default();
        let v1 = store.refresh("fsm", || json!({"id": "fsm", "states": []})).await.unwrap();
        assert_eq!(v1, 1);
        let v2 = store.refresh("fsm", || json!({"id": "fsm", "states": []})).await.unwrap();
        assert_eq!(v2, 1, "identical document must not bump the version");
        let v3 = store.refresh("fsm", || json!({"id": "fsm", "states": [{"id": "a"}]})).await.unwrap();
        assert_eq!(v3, 2);
    }
}
