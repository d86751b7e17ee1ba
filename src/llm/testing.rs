//! Scripted in-memory provider for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::provider::{LlmProvider, ProviderError};
use super::types::ChatRequest;

pub const VOCABULARY: [&str; 6] = ["paris", "france", "berlin", "germany", "capital", "rust"];

/// Embeds text as keyword counts (x10) over `VOCABULARY`, unless an exact
/// vector was registered for the text.
pub struct FakeProvider {
    answer: String,
    overrides: HashMap<String, Vec<f32>>,
    embed_calls: AtomicUsize,
    embedded: Mutex<Vec<String>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    failing_embed_calls: AtomicUsize,
    failing_chat_calls: AtomicUsize,
    embed_delay: Option<Duration>,
}

impl FakeProvider {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            overrides: HashMap::new(),
            embed_calls: AtomicUsize::new(0),
            embedded: Mutex::new(Vec::new()),
            chat_requests: Mutex::new(Vec::new()),
            failing_embed_calls: AtomicUsize::new(0),
            failing_chat_calls: AtomicUsize::new(0),
            embed_delay: None,
        }
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.overrides.insert(text.to_string(), vector);
        self
    }

    pub fn with_embed_delay(mut self, delay: Duration) -> Self {
        self.embed_delay = Some(delay);
        self
    }

    pub fn fail_next_embeds(&self, count: usize) {
        self.failing_embed_calls.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_chats(&self, count: usize) {
        self.failing_chat_calls.store(count, Ordering::SeqCst);
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn embedded_inputs(&self) -> Vec<String> {
        self.embedded.lock().unwrap().clone()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().unwrap().clone()
    }

    pub fn vector_for(&self, input: &str) -> Vec<f32> {
        let text = input
            .strip_prefix("passage: ")
            .or_else(|| input.strip_prefix("query: "))
            .unwrap_or(input);
        if let Some(vector) = self.overrides.get(text) {
            return vector.clone();
        }
        keyword_vector(text)
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    VOCABULARY
        .iter()
        .map(|term| words.iter().filter(|w| *w == term).count() as f32 * 10.0)
        .collect()
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl LlmProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ProviderError> {
        if take_failure(&self.failing_chat_calls) {
            return Err(ProviderError::Status {
                provider: "fake",
                status: 503,
                body: "chat unavailable".to_string(),
            });
        }
        self.chat_requests.lock().unwrap().push(request);
        Ok(self.answer.clone())
    }

    async fn embed(
        &self,
        inputs: &[String],
        _model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.embed_delay {
            tokio::time::sleep(delay).await;
        }
        if take_failure(&self.failing_embed_calls) {
            return Err(ProviderError::Status {
                provider: "fake",
                status: 503,
                body: "embeddings unavailable".to_string(),
            });
        }
        self.embedded.lock().unwrap().extend(inputs.iter().cloned());
        Ok(inputs.iter().map(|input| self.vector_for(input)).collect())
    }
}
