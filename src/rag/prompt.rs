//! Fixed instruction text and the grounded question prompt.

use crate::core::config::GenerationConfig;
use crate::llm::{ChatMessage, ChatRequest};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant who answers questions based on snippets of text provided in context. Keep your answers grounded in the context and be as concise as possible.";

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    generation: GenerationConfig,
}

impl PromptAssembler {
    pub fn new(generation: GenerationConfig) -> Self {
        Self { generation }
    }

    /// System instruction followed by one user turn carrying the question
    /// and the retrieved context verbatim.
    pub fn assemble(&self, query: &str, context: &str) -> ChatRequest {
        ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_prompt(query, context)),
        ])
        .with_config(&self.generation)
    }
}

pub fn user_prompt(query: &str, context: &str) -> String {
    format!("Question: {query}\n\nContext: {context}")
}
