use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the answering pipeline.
///
/// An unrelated query is not an error: it is reported as
/// `Answer::Unrelated`. A missing or corrupt persisted index is not an
/// error either; `IndexStore::load` reports it as an `IndexLoad` value so
/// that only those two outcomes trigger a rebuild.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("failed to load document {path}: {message}")]
    DocumentLoad { path: PathBuf, message: String },
    #[error("embedding service error: {0}")]
    EmbeddingService(String),
    #[error("generation service error: {0}")]
    GenerationService(String),
    #[error("index store error: {0}")]
    IndexStore(String),
    #[error("embedding cache error: {0}")]
    Cache(String),
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid config: {0}")]
    Config(String),
}

impl RagError {
    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::EmbeddingService(err.to_string())
    }

    pub fn generation<E: std::fmt::Display>(err: E) -> Self {
        RagError::GenerationService(err.to_string())
    }

    pub fn index_store<E: std::fmt::Display>(err: E) -> Self {
        RagError::IndexStore(err.to_string())
    }

    pub fn cache<E: std::fmt::Display>(err: E) -> Self {
        RagError::Cache(err.to_string())
    }

    pub fn document_load<E: std::fmt::Display>(path: impl Into<PathBuf>, err: E) -> Self {
        RagError::DocumentLoad {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Stable code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            RagError::DocumentLoad { .. } => "DOCUMENT_LOAD",
            RagError::EmbeddingService(_) => "EMBEDDING_SERVICE",
            RagError::GenerationService(_) => "GENERATION_SERVICE",
            RagError::IndexStore(_) => "INDEX_STORE",
            RagError::Cache(_) => "EMBEDDING_CACHE",
            RagError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            RagError::Config(_) => "CONFIG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_unique() {
        let errors = [
            RagError::document_load("a.txt", "missing"),
            RagError::embedding("down"),
            RagError::generation("down"),
            RagError::index_store("disk full"),
            RagError::cache("disk full"),
            RagError::DimensionMismatch {
                expected: 3,
                actual: 4,
            },
            RagError::Config("bad".to_string()),
        ];

        for (i, left) in errors.iter().enumerate() {
            for (j, right) in errors.iter().enumerate() {
                if i != j {
                    assert_ne!(left.error_code(), right.error_code());
                }
            }
        }
    }

    #[test]
    fn document_load_message_names_the_path() {
        let err = RagError::document_load("/tmp/notes.txt", "No such file");
        assert!(err.to_string().contains("/tmp/notes.txt"));
    }
}
