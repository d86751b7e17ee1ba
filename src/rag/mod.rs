//! Retrieval-augmented answering over a single document.
//!
//! - `Chunker`: splits document text into bounded passages
//! - `EmbeddingCache`: persistent text -> vector memoisation per model
//! - `VectorIndex` / `IndexStore`: exact L2 search and its on-disk form
//! - `Retriever`: relatedness gate over the nearest passages
//! - `AnswerService`: the whole flow from file and question to answer

pub mod chunker;
pub mod embedding_cache;
pub mod index;
pub mod loader;
pub mod prompt;
pub mod retriever;
pub mod service;
pub mod store;

pub use chunker::{Chunker, Passage};
pub use embedding_cache::{CacheStats, EmbeddingCache, EmbeddingVector};
pub use index::{IndexEntry, SearchHit, VectorIndex};
pub use loader::{DocumentLoader, PlainTextLoader};
pub use prompt::{PromptAssembler, SYSTEM_PROMPT};
pub use retriever::{RetrievalOutcome, Retriever};
pub use service::{Answer, AnswerService};
pub use store::{IndexLoad, IndexStore};
