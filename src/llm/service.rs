use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::config::{ProviderKind, RagConfig, RetryConfig};
use crate::core::errors::RagError;
use crate::llm::lmstudio::LmStudioProvider;
use crate::llm::ollama::OllamaProvider;
use crate::llm::provider::{LlmProvider, ProviderError};
use crate::llm::types::ChatRequest;
use crate::vector_math::is_finite_vector;

/// Wraps a provider with the configured models, deadlines and retry
/// policy, and maps provider failures onto `RagError`.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    embedding_model: String,
    chat_model: String,
    document_prefix: String,
    query_prefix: String,
    batch_size: usize,
    embedding_timeout: Duration,
    generation_timeout: Duration,
    retry: RetryConfig,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &RagConfig) -> Self {
        Self {
            provider,
            embedding_model: config.embedding.model.clone(),
            chat_model: config.generation.model.clone(),
            document_prefix: config.embedding.document_prefix.clone(),
            query_prefix: config.embedding.query_prefix.clone(),
            batch_size: config.embedding.batch_size.max(1),
            embedding_timeout: Duration::from_secs(config.embedding.timeout_secs),
            generation_timeout: Duration::from_secs(config.generation.timeout_secs),
            retry: config.retry,
        }
    }

    /// Builds the provider named by `config.provider.kind`.
    pub fn from_config(config: &RagConfig) -> Self {
        let base_url = config.provider.base_url.clone();
        let provider: Arc<dyn LlmProvider> = match config.provider.kind {
            ProviderKind::Ollama => Arc::new(OllamaProvider::new(base_url)),
            ProviderKind::OpenaiCompatible => Arc::new(LmStudioProvider::new(
                base_url,
                config.provider.api_key.clone(),
            )),
        };
        Self::new(provider, config)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Cache namespace: the embedding model name.
    pub fn namespace(&self) -> &str {
        &self.embedding_model
    }

    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await.unwrap_or(false)
    }

    /// Embeds passage texts, one vector per input, in input order.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let inputs: Vec<String> = batch
                .iter()
                .map(|text| format!("{}{}", self.document_prefix, text))
                .collect();
            let started = Instant::now();
            let embedded = self
                .call_with_retry(
                    "embedding",
                    self.embedding_timeout,
                    RagError::embedding,
                    || self.provider.embed(&inputs, &self.embedding_model),
                )
                .await?;
            check_embeddings(&embedded, inputs.len())?;
            tracing::debug!(
                "Embedded {} passages with {} in {:?}",
                inputs.len(),
                self.embedding_model,
                started.elapsed()
            );
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let inputs = vec![format!("{}{}", self.query_prefix, text)];
        let mut embedded = self
            .call_with_retry(
                "query embedding",
                self.embedding_timeout,
                RagError::embedding,
                || self.provider.embed(&inputs, &self.embedding_model),
            )
            .await?;
        check_embeddings(&embedded, 1)?;
        Ok(embedded.remove(0))
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<String, RagError> {
        let started = Instant::now();
        let answer = self
            .call_with_retry(
                "generation",
                self.generation_timeout,
                RagError::generation,
                || self.provider.chat(request.clone(), &self.chat_model),
            )
            .await?;
        tracing::info!(
            "Generated answer with {} in {:?}",
            self.chat_model,
            started.elapsed()
        );
        Ok(answer)
    }

    async fn call_with_retry<T, F, Fut>(
        &self,
        operation: &str,
        timeout: Duration,
        to_error: fn(String) -> RagError,
        mut call: F,
    ) -> Result<T, RagError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.retry.initial_backoff_ms);
        let mut attempt = 1;

        loop {
            let provider = self.provider.name();
            let (err, retryable) = match tokio::time::timeout(timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => (
                    to_error(format!("{} via {}: {}", operation, provider, err)),
                    err.is_retryable(),
                ),
                Err(_) => (
                    to_error(format!(
                        "{} via {} timed out after {:?}",
                        operation, provider, timeout
                    )),
                    true,
                ),
            };

            if !retryable || attempt >= attempts {
                return Err(err);
            }
            tracing::warn!(
                "Attempt {}/{} failed: {}; retrying in {:?}",
                attempt,
                attempts,
                err,
                backoff
            );
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
            attempt += 1;
        }
    }
}

fn check_embeddings(vectors: &[Vec<f32>], expected: usize) -> Result<(), RagError> {
    if vectors.len() != expected {
        return Err(RagError::EmbeddingService(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    for vector in vectors {
        if vector.is_empty() {
            return Err(RagError::EmbeddingService(
                "received an empty embedding".to_string(),
            ));
        }
        if vector.len() != first.len() {
            return Err(RagError::EmbeddingService(format!(
                "inconsistent embedding dimensions: {} and {}",
                first.len(),
                vector.len()
            )));
        }
        if !is_finite_vector(vector) {
            return Err(RagError::EmbeddingService(
                "embedding contains NaN or infinite values".to_string(),
            ));
        }
    }
    Ok(())
}
