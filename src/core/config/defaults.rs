pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBEDDING_MODEL: &str = "mxbai-embed-large";
pub const DEFAULT_CHAT_MODEL: &str = "llama3";

pub const DEFAULT_DOCUMENT_PREFIX: &str = "passage: ";
pub const DEFAULT_QUERY_PREFIX: &str = "query: ";

pub const DEFAULT_CHUNK_SIZE: usize = 450;
pub const DEFAULT_CHUNK_OVERLAP: usize = 0;

pub const DEFAULT_TOP_K: usize = 2;
pub const DEFAULT_RELATEDNESS_THRESHOLD: f32 = 250.0;

pub const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 300;

// llama3 has an 8K token window; ~4 chars per token.
pub const DEFAULT_CONTEXT_CHARS: usize = 8192 * 4;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 1;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

pub const REDACT_PLACEHOLDER: &str = "****";
