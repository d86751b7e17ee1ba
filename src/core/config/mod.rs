pub mod defaults;
pub mod paths;
pub mod service;
pub mod validation;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use paths::AppPaths;
pub use service::ConfigService;
pub use validation::validate_config;

use defaults::*;

/// Runtime configuration for the answering pipeline.
///
/// Every field has a default, so a partial `config.yml` only needs the
/// keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub provider: ProviderConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub index: IndexConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            index: IndexConfig::default(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl RagConfig {
    /// Copy safe to log: secrets replaced by a placeholder.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.provider.api_key.is_some() {
            copy.provider.api_key = Some(REDACT_PLACEHOLDER.to_string());
        }
        copy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
    /// Any server speaking the OpenAI `/v1` API (LM Studio, llama.cpp server, ...).
    OpenaiCompatible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model name; also the cache namespace.
    pub model: String,
    pub document_prefix: String,
    pub query_prefix: String,
    pub timeout_secs: u64,
    /// Maximum number of texts sent in one embedding request.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            document_prefix: DEFAULT_DOCUMENT_PREFIX.to_string(),
            query_prefix: DEFAULT_QUERY_PREFIX.to_string(),
            timeout_secs: DEFAULT_EMBEDDING_TIMEOUT_SECS,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i32>,
    /// Input budget of the chat model in characters. Prompts are never
    /// truncated, so `chunk_size * top_k` plus the fixed prompt text must
    /// fit in it.
    pub context_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            timeout_secs: DEFAULT_GENERATION_TIMEOUT_SECS,
            temperature: None,
            max_tokens: None,
            context_chars: DEFAULT_CONTEXT_CHARS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Gate on the closest hit only; every retrieved passage joins the context.
    Nearest,
    /// Gate on the closest hit, then drop any passage not itself under the threshold.
    EveryPassage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Squared L2 distance under which the nearest passage counts as related.
    /// Tuned for mxbai-embed-large; recalibrate when the model changes.
    pub relatedness_threshold: f32,
    pub gate_policy: GatePolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            relatedness_threshold: DEFAULT_RELATEDNESS_THRESHOLD,
            gate_policy: GatePolicy::Nearest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Accept persisted indexes whose manifest carries no checksum.
    pub allow_unverified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            initial_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub cache_dir: Option<PathBuf>,
    pub index_dir: Option<PathBuf>,
}
