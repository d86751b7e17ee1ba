//! Query embedding, nearest-passage search and the relatedness gate.

use crate::core::config::{GatePolicy, RetrievalConfig};
use crate::core::errors::RagError;
use crate::llm::LlmService;
use crate::rag::index::{SearchHit, VectorIndex};

pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    /// The nearest passage cleared the threshold.
    Answerable { context: String, hits: Vec<SearchHit> },
    /// Nothing close enough. `nearest` is the best distance seen, if any.
    Unrelated { message: String, nearest: Option<f32> },
}

impl RetrievalOutcome {
    pub fn is_answerable(&self) -> bool {
        matches!(self, Self::Answerable { .. })
    }
}

pub fn unrelated_message(query: &str) -> String {
    format!("The query {query} appears unrelated to the provided file.")
}

#[derive(Clone)]
pub struct Retriever {
    llm: LlmService,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(llm: LlmService, config: RetrievalConfig) -> Self {
        Self { llm, config }
    }

    pub async fn retrieve(
        &self,
        index: &VectorIndex,
        query: &str,
    ) -> Result<RetrievalOutcome, RagError> {
        if index.is_empty() {
            tracing::info!("Index for {} is empty; nothing to retrieve", index.document_id());
            return Ok(self.gate(query, Vec::new()));
        }

        let query_vector = self.llm.embed_query(query).await?;
        let hits = index.search(&query_vector, self.config.top_k)?;
        Ok(self.gate(query, hits))
    }

    /// Decides relatedness from hits sorted nearest first.
    pub fn gate(&self, query: &str, hits: Vec<SearchHit>) -> RetrievalOutcome {
        let threshold = self.config.relatedness_threshold;
        let nearest = hits.first().map(|hit| hit.distance);

        match nearest {
            Some(distance) if distance < threshold => {
                let hits: Vec<SearchHit> = match self.config.gate_policy {
                    GatePolicy::Nearest => hits,
                    GatePolicy::EveryPassage => hits
                        .into_iter()
                        .filter(|hit| hit.distance < threshold)
                        .collect(),
                };
                tracing::debug!(
                    "Query passed the relatedness gate (nearest {:.3} < {:.3}, {} passages)",
                    distance,
                    threshold,
                    hits.len()
                );
                let context = hits
                    .iter()
                    .map(|hit| hit.passage.text.as_str())
                    .collect::<Vec<_>>()
                    .join(CONTEXT_SEPARATOR);
                RetrievalOutcome::Answerable { context, hits }
            }
            _ => {
                tracing::info!(
                    "Query judged unrelated (nearest {:?}, threshold {:.3})",
                    nearest,
                    threshold
                );
                RetrievalOutcome::Unrelated {
                    message: unrelated_message(query),
                    nearest,
                }
            }
        }
    }
}
