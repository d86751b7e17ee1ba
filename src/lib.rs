//! Grounded question answering over a single document.
//!
//! The crate is organised the same way the pipeline runs:
//! - `core`: configuration, paths, logging, errors and store locks
//! - `llm`: the embedding/chat collaborators (`LlmProvider`)
//! - `rag`: chunking, the embedding cache, the vector index, the
//!   relevance gate, prompt assembly and the `AnswerService`

pub mod core;
pub mod llm;
pub mod rag;
pub mod vector_math;

pub use crate::core::config::{AppPaths, RagConfig};
pub use crate::core::errors::RagError;
pub use crate::rag::{Answer, AnswerService};
