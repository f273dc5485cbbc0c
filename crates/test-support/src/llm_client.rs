//! A scripted [`LlmClient`] for exercising the `llm` action and the engine
//! end to end without a real model: replies are supplied up front, in order,
//! and the last reply repeats once the script runs out.

use async_trait::async_trait;
use fsm_rt_core::error::Result;
use fsm_rt_core::schema::Schema;
use fsm_rt_core::store::LlmClient;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Replays a fixed sequence of raw replies, recording every prompt stack it
/// was called with so a test can assert on what the `llm` action composed
/// (spec §4.6 step 1).
pub struct ScriptedClient {
    replies: Vec<String>,
    calls: AtomicUsize,
    seen_prompts: Mutex<Vec<Vec<String>>>,
}

impl ScriptedClient {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
            seen_prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts_seen(&self) -> Vec<Vec<String>> {
        self.seen_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn invoke(&self, prompts: &[String], _schema: &Schema) -> Result<String> {
        self.seen_prompts.lock().unwrap().push(prompts.to_vec());
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .get(i)
            .or_else(|| self.replies.last())
            .expect("ScriptedClient needs at least one reply");
        Ok(reply.clone())
    }
}
